//! Relational database access
//!
//! The database pipeline depends on [`DatabaseRepository`] only. [`postgres`] provides the
//! sqlx implementation; [`schema`] turns raw metadata into the summary the planner reads.

pub mod connection;
pub mod postgres;
pub mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{QueryBridgeError, Result};

/// Row cap applied to every planned query
pub const DEFAULT_ROW_LIMIT: usize = 500;

/// One result row, column name → JSON value
pub type Row = Map<String, Value>;

/// Column description as reported by a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub referenced_table: Option<String>,
    #[serde(default)]
    pub referenced_column: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            is_primary_key: false,
            is_foreign_key: false,
            referenced_table: None,
            referenced_column: None,
        }
    }
}

/// Table description as reported by a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub row_count: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnMetadata>) -> Self {
        Self {
            name: name.into(),
            columns,
            row_count: None,
            description: None,
        }
    }
}

/// Database collaborator used by the database pipeline
#[async_trait]
pub trait DatabaseRepository: Send + Sync {
    /// Tables in discovery order
    async fn describe_schema(&self, connection: &str) -> Result<Vec<TableMetadata>>;

    /// Run a read-only statement, capped at `limit` rows unless it has its own LIMIT
    async fn fetch_rows(&self, connection: &str, sql: &str, limit: usize) -> Result<Vec<Row>>;
}

/// Reject anything that is not a SELECT statement
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let is_select = sql
        .trim_start()
        .get(..6)
        .map_or(false, |head| head.eq_ignore_ascii_case("SELECT"));

    if is_select {
        Ok(())
    } else {
        Err(QueryBridgeError::Validation(
            "Solo se permiten consultas SELECT".to_string(),
        ))
    }
}

/// Append `LIMIT n` unless the statement already mentions LIMIT
pub fn apply_row_limit(sql: &str, limit: usize) -> String {
    let trimmed = sql.trim();
    if trimmed.to_ascii_uppercase().contains("LIMIT") {
        return trimmed.to_string();
    }
    format!("{} LIMIT {}", trimmed.trim_end_matches(';').trim_end(), limit)
}
