//! PostgreSQL repository backed by sqlx.
//!
//! Pools are created lazily, one per connection URL, and shared by every pipeline
//! that targets the same database.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::connection::{DatabaseConnection, DatabaseType};
use super::{apply_row_limit, ensure_read_only, ColumnMetadata, DatabaseRepository, Row, TableMetadata};
use crate::{QueryBridgeError, Result};

const COLUMNS_QUERY: &str = r#"
SELECT c.table_name::text,
       c.column_name::text,
       c.data_type::text,
       (c.is_nullable = 'YES') AS nullable
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema AND t.table_name = c.table_name
WHERE c.table_schema = 'public' AND t.table_type = 'BASE TABLE'
ORDER BY c.table_name, c.ordinal_position
"#;

const KEYS_QUERY: &str = r#"
SELECT kcu.table_name::text,
       kcu.column_name::text,
       tc.constraint_type::text,
       ccu.table_name::text AS referenced_table,
       ccu.column_name::text AS referenced_column
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
LEFT JOIN information_schema.constraint_column_usage ccu
  ON tc.constraint_type = 'FOREIGN KEY'
 AND ccu.constraint_name = tc.constraint_name
 AND ccu.table_schema = tc.table_schema
WHERE tc.table_schema = 'public'
  AND tc.constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY')
"#;

/// sqlx-backed [`DatabaseRepository`] for PostgreSQL
pub struct PostgresRepository {
    pools: DashMap<String, PgPool>,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PostgresRepository {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Get or create the pool for a connection URL
    async fn get_pool(&self, url: &str) -> Result<PgPool> {
        if let Some(pool) = self.pools.get(url) {
            return Ok(pool.value().clone());
        }

        let connection = DatabaseConnection::from_url(url)?;
        if connection.db_type != DatabaseType::PostgreSQL {
            return Err(QueryBridgeError::Configuration(format!(
                "Unsupported database type '{}'; only PostgreSQL is available",
                connection.db_type
            )));
        }

        info!(database = %connection, "creating connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&connection.driver_url())
            .await
            .map_err(|e| QueryBridgeError::Discovery(format!("Failed to connect to database: {}", e)))?;

        // Concurrent first use may build two pools; the last insert wins
        self.pools.insert(url.to_string(), pool.clone());
        Ok(pool)
    }

    async fn safe_row_count(pool: &PgPool, table: &str) -> Option<i64> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", table.replace('"', "\"\""));
        match sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(table, error = %e, "row count unavailable");
                None
            }
        }
    }
}

impl Default for PostgresRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseRepository for PostgresRepository {
    async fn describe_schema(&self, connection: &str) -> Result<Vec<TableMetadata>> {
        let pool = self.get_pool(connection).await?;

        let columns = sqlx::query_as::<_, (String, String, String, bool)>(COLUMNS_QUERY)
            .fetch_all(&pool)
            .await
            .map_err(|e| QueryBridgeError::Discovery(format!("Failed to read columns: {}", e)))?;

        let keys = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>)>(
            KEYS_QUERY,
        )
        .fetch_all(&pool)
        .await
        .map_err(|e| QueryBridgeError::Discovery(format!("Failed to read key constraints: {}", e)))?;

        let mut primary_keys: HashSet<(String, String)> = HashSet::new();
        let mut foreign_keys: HashMap<(String, String), (Option<String>, Option<String>)> =
            HashMap::new();
        for (table, column, kind, ref_table, ref_column) in keys {
            if kind == "PRIMARY KEY" {
                primary_keys.insert((table, column));
            } else {
                foreign_keys.insert((table, column), (ref_table, ref_column));
            }
        }

        let mut tables: Vec<TableMetadata> = Vec::new();
        for (table, column, data_type, nullable) in columns {
            let key = (table.clone(), column.clone());
            let mut meta = ColumnMetadata::new(column, data_type);
            meta.nullable = nullable;
            meta.is_primary_key = primary_keys.contains(&key);
            if let Some((ref_table, ref_column)) = foreign_keys.get(&key) {
                meta.is_foreign_key = true;
                meta.referenced_table = ref_table.clone();
                meta.referenced_column = ref_column.clone();
            }

            match tables.last_mut() {
                Some(current) if current.name == table => current.columns.push(meta),
                _ => tables.push(TableMetadata::new(table, vec![meta])),
            }
        }

        for table in &mut tables {
            table.row_count = Self::safe_row_count(&pool, &table.name).await;
        }

        debug!(table_count = tables.len(), "schema described");
        Ok(tables)
    }

    async fn fetch_rows(&self, connection: &str, sql: &str, limit: usize) -> Result<Vec<Row>> {
        ensure_read_only(sql)?;
        let limited = apply_row_limit(sql, limit);
        let pool = self.get_pool(connection).await?;

        // row_to_json keeps column names and types without a per-type decoder
        let wrapped = format!(
            "SELECT row_to_json(q) FROM ({}) AS q",
            limited.trim_end_matches(';')
        );
        debug!(sql = %limited, "executing query");

        let values = sqlx::query_scalar::<_, Value>(&wrapped)
            .fetch_all(&pool)
            .await
            .map_err(|e| QueryBridgeError::Execution(e.to_string()))?;

        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_select_is_rejected_before_connecting() {
        let repository = PostgresRepository::new();
        let err = repository
            .fetch_rows("postgres://nobody@127.0.0.1:1/none", "DELETE FROM orders", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryBridgeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_non_postgres_url_is_a_configuration_error() {
        let repository = PostgresRepository::new();
        let err = repository
            .describe_schema("mysql://root@localhost/app")
            .await
            .unwrap_err();
        assert!(matches!(err, QueryBridgeError::Configuration(_)));
    }
}
