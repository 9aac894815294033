//! Result presenters for the CLI and any other text front end.
//!
//! Headings follow the product locale (Spanish).

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use crate::models::QueryResult;
use crate::QueryBridgeError;

/// Rows shown per source in the Markdown report
const MARKDOWN_PREVIEW_ROWS: usize = 5;
const RULE_WIDTH: usize = 60;

pub trait ResultPresenter: Send + Sync {
    fn present(&self, result: &QueryResult) -> String;

    /// For failures that never produced a [`QueryResult`] (e.g. invalid input)
    fn present_error(&self, error: &dyn std::error::Error) -> String;
}

/// Output formats selectable from front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn presenter(&self) -> Box<dyn ResultPresenter> {
        match self {
            OutputFormat::Text => Box::new(TextPresenter),
            OutputFormat::Json => Box::new(JsonPresenter),
            OutputFormat::Markdown => Box::new(MarkdownPresenter),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = QueryBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(QueryBridgeError::Configuration(format!(
                "unknown output format: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "markdown",
        })
    }
}

/// Pretty-printed JSON
pub struct JsonPresenter;

impl ResultPresenter for JsonPresenter {
    fn present(&self, result: &QueryResult) -> String {
        let payload = json!({
            "id": result.id,
            "status": result.status,
            "response": result.response_text,
            "analysis": result.analysis,
            "data": result.data,
            "metadata": result.metadata,
            "execution_time": result.execution_time,
            "timestamp": result.timestamp.to_rfc3339(),
            "error": result.error,
        });
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
    }

    fn present_error(&self, error: &dyn std::error::Error) -> String {
        let payload = json!({"status": "error", "error": error.to_string()});
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
    }
}

/// Report-style Markdown
pub struct MarkdownPresenter;

impl MarkdownPresenter {
    /// Rows worth previewing for one data record
    fn preview_rows(entry: &Value) -> Vec<&serde_json::Map<String, Value>> {
        let rows = entry
            .get("data")
            .or_else(|| entry.get("response").and_then(|response| response.get("data")));

        match rows {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_object)
                .take(MARKDOWN_PREVIEW_ROWS)
                .collect(),
            Some(Value::Object(row)) => vec![row],
            _ => Vec::new(),
        }
    }
}

impl ResultPresenter for MarkdownPresenter {
    fn present(&self, result: &QueryResult) -> String {
        let mut lines = vec![
            "# Reporte de Consulta".to_string(),
            String::new(),
            format!("**Estado:** {}", result.status),
            format!("**Tiempo de ejecución:** {:.2}s", result.execution_time),
            String::new(),
            "## Respuesta".to_string(),
            non_empty_or(&result.response_text, "(sin respuesta)"),
            String::new(),
        ];

        if let Some(analysis) = &result.analysis {
            lines.extend(["## Análisis".to_string(), analysis.clone(), String::new()]);
        }

        if !result.data.is_empty() {
            lines.push("## Datos".to_string());
            for entry in &result.data {
                let source = entry
                    .get("source")
                    .and_then(Value::as_str)
                    .unwrap_or("desconocido");
                lines.push(format!("### Fuente: {}", source));

                let rows = Self::preview_rows(entry);
                if !rows.is_empty() {
                    lines.push("| Clave | Valor |".to_string());
                    lines.push("| --- | --- |".to_string());
                    for row in rows {
                        for (key, value) in row {
                            lines.push(format!("| {} | {} |", key, value));
                        }
                    }
                    lines.push(String::new());
                }
            }
        }

        if !result.metadata.is_empty() {
            lines.push("## Metadata".to_string());
            for (key, value) in &result.metadata {
                lines.push(format!("- **{}**: {}", key, value));
            }
        }

        if let Some(error) = &result.error {
            lines.extend([String::new(), format!("**Error:** {}", error)]);
        }

        lines.join("\n")
    }

    fn present_error(&self, error: &dyn std::error::Error) -> String {
        format!("# Error\n\n{}", error)
    }
}

/// Plain terminal text
pub struct TextPresenter;

impl TextPresenter {
    fn banner(lines: &mut Vec<String>, title: &str) {
        let rule = "=".repeat(RULE_WIDTH);
        lines.push(rule.clone());
        lines.push(title.to_string());
        lines.push(rule);
    }
}

impl ResultPresenter for TextPresenter {
    fn present(&self, result: &QueryResult) -> String {
        let mut lines = Vec::new();
        Self::banner(&mut lines, "RESULTADO");
        lines.push(non_empty_or(&result.response_text, "(sin respuesta)"));
        lines.push(String::new());

        if let Some(analysis) = &result.analysis {
            Self::banner(&mut lines, "ANÁLISIS");
            lines.push(analysis.clone());
            lines.push(String::new());
        }

        if !result.metadata.is_empty() {
            Self::banner(&mut lines, "METADATA");
            for (key, value) in &result.metadata {
                lines.push(format!("- {}: {}", key, value));
            }
            lines.push(String::new());
        }

        lines.push(format!("Tiempo de ejecución: {:.2}s", result.execution_time));
        if let Some(error) = &result.error {
            lines.push(format!("ERROR: {}", error));
        }
        lines.join("\n")
    }

    fn present_error(&self, error: &dyn std::error::Error) -> String {
        format!("ERROR: {}", error)
    }
}

fn non_empty_or(text: &str, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryStatus;
    use std::time::Duration;

    fn sample() -> QueryResult {
        QueryResult::new(QueryStatus::Success, "Hay 42 pedidos.")
            .with_analysis(Some("Los pedidos crecen.".to_string()))
            .with_data(vec![json!({
                "table": "orders",
                "source": "orders",
                "sql": "SELECT COUNT(*) AS count FROM orders",
                "data": [{"count": 42}]
            })])
            .with_metadata("step", "complete")
            .with_execution_time(Duration::from_millis(1250))
    }

    #[test]
    fn test_json_presenter() {
        let output = JsonPresenter.present(&sample());
        let value: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["status"], "success");
        assert_eq!(value["response"], "Hay 42 pedidos.");
        assert_eq!(value["metadata"]["step"], "complete");
        assert!(value["error"].is_null());
    }

    #[test]
    fn test_markdown_presenter_tables_rows() {
        let output = MarkdownPresenter.present(&sample());

        assert!(output.starts_with("# Reporte de Consulta"));
        assert!(output.contains("**Estado:** success"));
        assert!(output.contains("**Tiempo de ejecución:** 1.25s"));
        assert!(output.contains("### Fuente: orders"));
        assert!(output.contains("| count | 42 |"));
        assert!(output.contains("- **step**: \"complete\""));
    }

    #[test]
    fn test_text_presenter_error_result() {
        let result = QueryResult::failure("boom", Duration::from_secs(2));
        let output = TextPresenter.present(&result);

        assert!(output.contains("(sin respuesta)"));
        assert!(output.contains("Tiempo de ejecución: 2.00s"));
        assert!(output.ends_with("ERROR: boom"));
        assert!(!output.contains("ANÁLISIS"));
    }

    #[test]
    fn test_present_error() {
        let err = QueryBridgeError::Configuration("bad input".to_string());
        assert_eq!(TextPresenter.present_error(&err), "ERROR: Configuration error: bad input");
        assert_eq!(
            MarkdownPresenter.present_error(&err),
            "# Error\n\nConfiguration error: bad input"
        );
        assert!(JsonPresenter.present_error(&err).contains("\"status\": \"error\""));
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert!("yaml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default().to_string(), "text");
    }
}
