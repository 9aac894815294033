// Database schema model
// Built from repository metadata; its summary is what the query planner reads

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::TableMetadata;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub referenced_table: Option<String>,
    pub referenced_column: Option<String>,
}

impl TableColumn {
    /// `  - name: type (PK, FK->t.c) NOT NULL`
    fn summary_line(&self) -> String {
        let mut annotations = Vec::new();
        if self.is_primary_key {
            annotations.push("PK".to_string());
        }
        if self.is_foreign_key {
            annotations.push(format!(
                "FK->{}.{}",
                self.referenced_table.as_deref().unwrap_or("?"),
                self.referenced_column.as_deref().unwrap_or("?")
            ));
        }

        let mut line = format!("  - {}: {}", self.name, self.data_type);
        if !annotations.is_empty() {
            line.push_str(&format!(" ({})", annotations.join(", ")));
        }
        line.push_str(if self.nullable { " NULLABLE" } else { " NOT NULL" });
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseTable {
    pub name: String,
    pub columns: Vec<TableColumn>,
    pub row_count: Option<i64>,
    pub description: Option<String>,
}

impl DatabaseTable {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn primary_keys(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn foreign_keys(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_foreign_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Discovered schema of one database
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSchema {
    pub database_name: String,
    pub tables: Vec<DatabaseTable>,
    pub discovered_at: DateTime<Utc>,
}

impl DatabaseSchema {
    pub fn get_table(&self, name: &str) -> Option<&DatabaseTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Largest tables first; unknown row counts sort as zero
    pub fn top_tables(&self, limit: usize) -> Vec<&DatabaseTable> {
        let mut tables: Vec<&DatabaseTable> = self.tables.iter().collect();
        tables.sort_by_key(|t| std::cmp::Reverse(t.row_count.unwrap_or(0)));
        tables.truncate(limit);
        tables
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Human-readable listing of every table and column
    pub fn summary(&self) -> String {
        let mut lines = vec![String::new()];
        for table in &self.tables {
            lines.push(format!("Tabla: {}", table.name));
            lines.extend(table.columns.iter().map(TableColumn::summary_line));
            lines.push(String::new());
        }
        lines.join("\n")
    }
}

/// Builds [`DatabaseSchema`] values from repository metadata
pub struct SchemaAnalyzer;

impl SchemaAnalyzer {
    pub fn build_schema(database_name: impl Into<String>, metadata: Vec<TableMetadata>) -> DatabaseSchema {
        let tables = metadata
            .into_iter()
            .map(|table| DatabaseTable {
                name: table.name,
                columns: table
                    .columns
                    .into_iter()
                    .map(|c| TableColumn {
                        name: c.name,
                        data_type: c.data_type,
                        nullable: c.nullable,
                        is_primary_key: c.is_primary_key,
                        is_foreign_key: c.is_foreign_key,
                        referenced_table: c.referenced_table,
                        referenced_column: c.referenced_column,
                    })
                    .collect(),
                row_count: table.row_count,
                description: table.description,
            })
            .collect();

        DatabaseSchema {
            database_name: database_name.into(),
            tables,
            discovered_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ColumnMetadata;

    fn sample_schema() -> DatabaseSchema {
        let mut id = ColumnMetadata::new("id", "integer");
        id.nullable = false;
        id.is_primary_key = true;

        let mut user_id = ColumnMetadata::new("user_id", "integer");
        user_id.is_foreign_key = true;
        user_id.referenced_table = Some("users".to_string());
        user_id.referenced_column = Some("id".to_string());

        let mut orders = TableMetadata::new("orders", vec![id.clone(), user_id]);
        orders.row_count = Some(120);
        let mut users = TableMetadata::new("users", vec![id, ColumnMetadata::new("email", "text")]);
        users.row_count = Some(40);
        let logs = TableMetadata::new("logs", vec![]);

        SchemaAnalyzer::build_schema("postgres://localhost/shop", vec![users, orders, logs])
    }

    #[test]
    fn test_summary_annotates_keys_and_nullability() {
        let summary = sample_schema().summary();

        assert!(summary.contains("Tabla: orders"));
        assert!(summary.contains("  - id: integer (PK) NOT NULL"));
        assert!(summary.contains("  - user_id: integer (FK->users.id) NULLABLE"));
        assert!(summary.contains("  - email: text NULLABLE"));
    }

    #[test]
    fn test_top_tables_orders_by_row_count() {
        let schema = sample_schema();
        let names: Vec<&str> = schema.top_tables(2).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "users"]);
    }

    #[test]
    fn test_table_lookup_and_keys() {
        let schema = sample_schema();
        let orders = schema.get_table("orders").unwrap();
        assert_eq!(orders.primary_keys(), vec!["id"]);
        assert_eq!(orders.foreign_keys(), vec!["user_id"]);
        assert_eq!(orders.column_names(), vec!["id", "user_id"]);
        assert!(schema.get_table("missing").is_none());
        assert_eq!(schema.table_names(), vec!["users", "orders", "logs"]);
    }
}
