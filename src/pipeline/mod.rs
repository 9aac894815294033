//! # Query Pipelines
//!
//! A pipeline turns one natural-language question into backend calls and an analysis.
//! Two flavours exist:
//!
//! - [`database`]: schema → table selection → SQL planning → execution → analysis
//! - [`api`]: spec discovery → endpoint selection → GET requests → analysis
//!
//! ## Rust Learning Notes:
//!
//! ### Typed stage outputs
//! Each stage consumes the previous stage's output by value and returns the next one:
//!
//! ```text
//! SchemaLoaded ──select──▶ TablesSelected ──plan──▶ QueriesPlanned ──execute──▶ ...
//! ```
//!
//! A later stage cannot read something an earlier stage never produced, because the
//! type carrying it does not exist yet.
//!
//! ### Short-circuit with `?`
//! Fallible stages return `Result<Next, StageFailure>`. The driver chains them with `?`,
//! so the first failure stops the run and no stage has to check an error flag.

pub mod api;
pub mod database;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage names reported in result metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Started,
    SchemaLoaded,
    TablesSelected,
    QueriesPlanned,
    QueriesExecuted,
    EndpointsDiscovered,
    EndpointsSelected,
    DataFetched,
    AnalysisComplete,
    Complete,
    Error,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Started => "started",
            PipelineStep::SchemaLoaded => "schema_loaded",
            PipelineStep::TablesSelected => "tables_selected",
            PipelineStep::QueriesPlanned => "queries_planned",
            PipelineStep::QueriesExecuted => "queries_executed",
            PipelineStep::EndpointsDiscovered => "endpoints_discovered",
            PipelineStep::EndpointsSelected => "endpoints_selected",
            PipelineStep::DataFetched => "data_fetched",
            PipelineStep::AnalysisComplete => "analysis_complete",
            PipelineStep::Complete => "complete",
            PipelineStep::Error => "error",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a pipeline run.
///
/// `stage` is the step the run was working towards when it failed; `message` becomes the
/// command's error string unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StageFailure {
    pub stage: PipelineStep,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: PipelineStep, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Values from LLM replies that may be objects or bare strings
pub(crate) fn string_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
