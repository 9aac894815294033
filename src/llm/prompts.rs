//! Prompt templates, one per use site.
//!
//! The user-facing language of the product is Spanish, so prompts are too.

use serde_json::Value;

use super::ChatMessage;

const SQL_PLANNER_SYSTEM: &str =
    "Eres un asistente experto en SQL. Genera consultas seguras basadas en el esquema.";

const DATABASE_ANALYST_SYSTEM: &str =
    "Eres un analista de datos. Resume la información de manera clara.";

const ENDPOINT_SELECTOR_SYSTEM: &str = "Eres un asistente experto en APIs REST. Tu tarea es seleccionar los endpoints más relevantes
para responder la pregunta del usuario.

Reglas:
1. Selecciona solo endpoints que sean útiles para la pregunta
2. Prefiere endpoints GET cuando sea posible
3. Considera los tags y descripciones para entender el propósito
4. Devuelve un JSON con la clave \"endpoints\" conteniendo una lista de objetos con \"path\" y \"method\"
5. Si un endpoint necesita parámetros de ruta o de consulta, inclúyelos en \"path_params\" y \"query_params\"";

const API_ANALYST_SYSTEM: &str = "Eres un analista experto que interpreta respuestas de APIs REST.
Tu tarea es analizar los datos obtenidos y responder la pregunta del usuario de forma clara y concisa.
Si hay errores en las respuestas, menciónalos brevemente.";

/// Messages asking for `{"queries": [{"table", "sql"}]}`
pub fn query_plan_messages(schema_summary: &str, tables: &[String], question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SQL_PLANNER_SYSTEM),
        ChatMessage::user(format!(
            "Esquema disponible:\n{}\n\nTablas relevantes: {}\n\nPregunta: {}\n\
             Devuelve un JSON con una lista \"queries\" donde cada elemento tiene \"table\" y \"sql\". \
             Usa solo sentencias SELECT.",
            schema_summary,
            tables.join(", "),
            question
        )),
    ]
}

/// Messages asking for `{"endpoints": [{"path", "method"}]}`
pub fn endpoint_selection_messages(
    endpoints_summary: &str,
    question: &str,
    max_endpoints: usize,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(ENDPOINT_SELECTOR_SYSTEM),
        ChatMessage::user(format!(
            "Endpoints disponibles en la API:\n{}\n\nPregunta del usuario: {}\n\n\
             Selecciona hasta {} endpoints relevantes.\n\
             Responde SOLO con JSON válido en este formato:\n\
             {{\"endpoints\": [{{\"path\": \"/example\", \"method\": \"GET\"}}, ...]}}",
            endpoints_summary, question, max_endpoints
        )),
    ]
}

pub fn database_analysis_messages(analysis_prompt: String) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(DATABASE_ANALYST_SYSTEM),
        ChatMessage::user(analysis_prompt),
    ]
}

pub fn api_analysis_messages(analysis_prompt: String) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(API_ANALYST_SYSTEM),
        ChatMessage::user(analysis_prompt),
    ]
}

/// Builds the data section of analysis prompts
pub struct DataAnalyzer;

impl DataAnalyzer {
    /// Rows shown per source
    pub const PREVIEW_ROWS: usize = 3;

    /// Question, then each source with its row count and a short preview.
    ///
    /// Records are read from `records`, `data` or `response`, whichever is present first;
    /// a single object counts as one row.
    pub fn build_analysis_prompt(user_query: &str, samples: &[Value]) -> String {
        let mut lines = vec![
            "Analiza los siguientes datos para responder la pregunta del usuario.".to_string(),
            format!("Pregunta del usuario: {}", user_query),
            String::new(),
            "Datos disponibles:".to_string(),
        ];

        for sample in samples {
            let source = sample
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or("desconocido");

            let records: Vec<&Value> = ["records", "data", "response"]
                .iter()
                .filter_map(|key| sample.get(*key))
                .find(|value| !is_empty_value(value))
                .map(|value| match value {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                })
                .unwrap_or_default();

            lines.push(format!("- Fuente: {} (total filas: {})", source, records.len()));

            if !records.is_empty() {
                lines.push("  Ejemplos:".to_string());
                for row in records.iter().take(Self::PREVIEW_ROWS) {
                    lines.push(format!("    • {}", row));
                }
            }
            if let Some(error) = sample.get("error").and_then(Value::as_str) {
                lines.push(format!("  Error: {}", error));
            }
            lines.push(String::new());
        }

        lines.push("Proporciona un resumen claro, insights y respuestas concretas.".to_string());
        lines.join("\n")
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
