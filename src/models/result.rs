// Query results
// One per command execution, whether it succeeded or not

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Error,
    Partial,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
            QueryStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one command execution.
///
/// `data` holds one record per source (table or endpoint); `metadata` carries
/// diagnostics such as the last pipeline step reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: Uuid,
    pub status: QueryStatus,
    pub response_text: String,
    pub analysis: Option<String>,
    pub data: Vec<Value>,
    pub metadata: Map<String, Value>,
    /// Seconds
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl QueryResult {
    pub fn new(status: QueryStatus, response_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status,
            response_text: response_text.into(),
            analysis: None,
            data: Vec::new(),
            metadata: Map::new(),
            execution_time: 0.0,
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Error result for a failure outside the pipelines (validation, timeout, panic)
    pub fn failure(error: impl Into<String>, elapsed: Duration) -> Self {
        Self::new(QueryStatus::Error, "").with_error(error).with_execution_time(elapsed)
    }

    pub fn with_analysis(mut self, analysis: Option<String>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed.as_secs_f64();
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn step(&self) -> Option<&str> {
        self.metadata.get("step").and_then(Value::as_str)
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "[{}] {} ({:.2}s)", self.status, error, self.execution_time),
            None => write!(
                f,
                "[{}] {} source(s) ({:.2}s)",
                self.status,
                self.data.len(),
                self.execution_time
            ),
        }
    }
}
