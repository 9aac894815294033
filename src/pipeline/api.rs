// API query pipeline
// discover → select endpoints → fetch (GET only) → analyze → finalize

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{string_field, PipelineStep, StageFailure};
use crate::auth::Headers;
use crate::llm::prompts::{api_analysis_messages, endpoint_selection_messages, DataAnalyzer};
use crate::llm::{parse_json_reply, LanguageModel};
use crate::openapi::{ApiEndpoint, ApiRepository, ApiRequest, HttpMethod};
use crate::QueryBridgeError;

type StageResult<T> = std::result::Result<T, StageFailure>;

pub const NO_ENDPOINTS_MESSAGE: &str = "No se encontraron endpoints en el spec";
pub const NO_DATA_ANALYSIS: &str = "No se obtuvieron datos de la API.";

const SUMMARY_DESCRIPTION_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct EndpointsDiscovered {
    pub endpoints: Vec<ApiEndpoint>,
}

/// An endpoint chosen by the model plus the arguments it asked for
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub endpoint: ApiEndpoint,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
}

impl Selection {
    pub fn new(endpoint: ApiEndpoint) -> Self {
        Self {
            endpoint,
            path_params: HashMap::new(),
            query_params: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointsSelected {
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone)]
pub struct DataFetched {
    pub records: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ApiAnalyzed {
    pub records: Vec<Value>,
    pub analysis: String,
}

/// Everything a finished run exposes, successful or not
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRun {
    /// Last stage that completed
    pub step: PipelineStep,
    pub failed_stage: Option<PipelineStep>,
    pub error: Option<String>,
    pub final_response: Option<String>,
    pub analysis: Option<String>,
    pub endpoints_discovered: usize,
    pub selected_endpoints: Vec<ApiEndpoint>,
    pub api_data: Vec<Value>,
}

impl ApiRun {
    fn started() -> Self {
        Self {
            step: PipelineStep::Started,
            failed_stage: None,
            error: None,
            final_response: None,
            analysis: None,
            endpoints_discovered: 0,
            selected_endpoints: Vec::new(),
            api_data: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// `GET /users` for every selected endpoint
    pub fn endpoints_used(&self) -> Vec<String> {
        self.selected_endpoints.iter().map(ApiEndpoint::identifier).collect()
    }
}

/// One line per endpoint: `- METHOD /path (id: op) - summary [tags: a, b]`
pub fn endpoints_summary(endpoints: &[ApiEndpoint]) -> String {
    endpoints
        .iter()
        .map(|endpoint| {
            let mut line = format!("- {} {}", endpoint.method, endpoint.path);
            if let Some(id) = &endpoint.operation_id {
                line.push_str(&format!(" (id: {})", id));
            }
            let summary = if endpoint.summary.is_empty() {
                endpoint
                    .description
                    .chars()
                    .take(SUMMARY_DESCRIPTION_CHARS)
                    .collect()
            } else {
                endpoint.summary.clone()
            };
            if !summary.is_empty() {
                line.push_str(&format!(" - {}", summary));
            }
            if !endpoint.tags.is_empty() {
                line.push_str(&format!(" [tags: {}]", endpoint.tags.join(", ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// What one selection entry asks for
struct Wanted<'a> {
    operation_id: Option<&'a str>,
    path: Option<&'a str>,
    method: Option<&'a str>,
}

impl<'a> Wanted<'a> {
    fn from_value(selection: &'a Value) -> Option<Self> {
        match selection {
            Value::Object(_) => Some(Self {
                operation_id: string_field(selection, "operation_id")
                    .or_else(|| string_field(selection, "operationId")),
                path: string_field(selection, "path"),
                method: string_field(selection, "method"),
            }),
            Value::String(raw) => {
                let raw = raw.trim();
                if raw.is_empty() {
                    return None;
                }
                // "GET /users"
                if let Some((method, path)) = raw.split_once(char::is_whitespace) {
                    if HttpMethod::parse(method).is_some() {
                        return Some(Self {
                            operation_id: None,
                            path: Some(path.trim()),
                            method: Some(method),
                        });
                    }
                }
                Some(Self {
                    operation_id: Some(raw),
                    path: Some(raw),
                    method: None,
                })
            }
            _ => None,
        }
    }

    fn matches_operation_id(&self, endpoint: &ApiEndpoint) -> bool {
        matches!(
            (self.operation_id, endpoint.operation_id.as_deref()),
            (Some(wanted), Some(actual)) if wanted == actual
        )
    }

    fn matches_path(&self, endpoint: &ApiEndpoint) -> bool {
        self.path == Some(endpoint.path.as_str())
            && self
                .method
                .map_or(true, |m| m.eq_ignore_ascii_case(endpoint.method.as_str()))
    }

    /// Search the whole catalog by operationId before falling back to path
    fn find_in<'e>(&self, endpoints: &'e [ApiEndpoint]) -> Option<&'e ApiEndpoint> {
        endpoints
            .iter()
            .find(|endpoint| self.matches_operation_id(endpoint))
            .or_else(|| endpoints.iter().find(|endpoint| self.matches_path(endpoint)))
    }
}

fn string_map(selection: &Value, key: &str) -> HashMap<String, String> {
    selection
        .get(key)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(name, value)| {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        _ => return None,
                    };
                    Some((name.clone(), value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Map model selections back to discovered endpoints.
///
/// An operationId match anywhere in the catalog wins over a path (+ method when given) match. Unmatched selections are
/// dropped and an endpoint is kept once even if selected repeatedly.
pub fn match_selections(selections: &[Value], endpoints: &[ApiEndpoint]) -> Vec<Selection> {
    let mut matched: Vec<Selection> = Vec::new();

    for raw in selections {
        let Some(wanted) = Wanted::from_value(raw) else {
            continue;
        };
        let Some(endpoint) = wanted.find_in(endpoints) else {
            debug!(selection = %raw, "selection matched no endpoint");
            continue;
        };
        if matched.iter().any(|s| s.endpoint == *endpoint) {
            continue;
        }

        matched.push(Selection {
            endpoint: endpoint.clone(),
            path_params: string_map(raw, "path_params"),
            query_params: string_map(raw, "query_params"),
        });
    }

    matched
}

/// Natural-language questions over an OpenAPI-described HTTP API
pub struct ApiPipeline {
    api: Arc<dyn ApiRepository>,
    llm: Arc<dyn LanguageModel>,
}

impl ApiPipeline {
    pub fn new(api: Arc<dyn ApiRepository>, llm: Arc<dyn LanguageModel>) -> Self {
        Self { api, llm }
    }

    /// Run every stage in order, stopping at the first failure
    pub async fn run(
        &self,
        swagger_url: &str,
        user_query: &str,
        auth_headers: &Headers,
        max_endpoints: usize,
    ) -> ApiRun {
        let mut run = ApiRun::started();

        match self
            .drive(swagger_url, user_query, auth_headers, max_endpoints, &mut run)
            .await
        {
            Ok(analyzed) => {
                run.analysis = Some(analyzed.analysis.clone());
                run.final_response = Some(analyzed.analysis);
                run.step = PipelineStep::Complete;
            }
            Err(failure) => {
                warn!(stage = %failure.stage, error = %failure.message, "api pipeline failed");
                run.final_response = None;
                run.failed_stage = Some(failure.stage);
                run.error = Some(failure.message);
            }
        }
        run
    }

    async fn drive(
        &self,
        swagger_url: &str,
        user_query: &str,
        auth_headers: &Headers,
        max_endpoints: usize,
        run: &mut ApiRun,
    ) -> StageResult<ApiAnalyzed> {
        let discovered = self.discover(swagger_url, auth_headers).await?;
        run.endpoints_discovered = discovered.endpoints.len();
        run.step = PipelineStep::EndpointsDiscovered;

        let selected = self.select(discovered, user_query, max_endpoints).await?;
        run.selected_endpoints = selected.selections.iter().map(|s| s.endpoint.clone()).collect();
        run.step = PipelineStep::EndpointsSelected;

        let fetched = self.fetch(selected, auth_headers).await;
        run.api_data = fetched.records.clone();
        run.step = PipelineStep::DataFetched;

        let analyzed = self.analyze(fetched, user_query).await?;
        run.step = PipelineStep::AnalysisComplete;
        Ok(analyzed)
    }

    pub async fn discover(&self, swagger_url: &str, auth_headers: &Headers) -> StageResult<EndpointsDiscovered> {
        let endpoints = self
            .api
            .discover_endpoints(swagger_url, auth_headers)
            .await
            .map_err(|e| {
                StageFailure::new(
                    PipelineStep::EndpointsDiscovered,
                    format!("Error descubriendo endpoints: {}", e),
                )
            })?;

        info!(url = swagger_url, count = endpoints.len(), "endpoints discovered");
        Ok(EndpointsDiscovered { endpoints })
    }

    pub async fn select(
        &self,
        discovered: EndpointsDiscovered,
        user_query: &str,
        max_endpoints: usize,
    ) -> StageResult<EndpointsSelected> {
        let fail = |e: QueryBridgeError| {
            StageFailure::new(
                PipelineStep::EndpointsSelected,
                format!("Error seleccionando endpoints: {}", e),
            )
        };

        if discovered.endpoints.is_empty() {
            return Err(StageFailure::new(PipelineStep::EndpointsSelected, NO_ENDPOINTS_MESSAGE));
        }

        let summary = endpoints_summary(&discovered.endpoints);
        let messages = endpoint_selection_messages(&summary, user_query, max_endpoints);
        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| fail(e.into()))?;
        let plan = parse_json_reply(&reply).map_err(|e| fail(e.into()))?;

        let wanted = match &plan {
            Value::Object(map) => map
                .get("endpoints")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        };

        let mut selections = match_selections(&wanted, &discovered.endpoints);
        selections.truncate(max_endpoints);

        info!(
            requested = wanted.len(),
            selected = selections.len(),
            model = self.llm.model_name(),
            "endpoints selected"
        );
        Ok(EndpointsSelected { selections })
    }

    /// GET requests only; other methods are recorded as skipped
    pub async fn fetch(&self, selected: EndpointsSelected, auth_headers: &Headers) -> DataFetched {
        let mut records = Vec::with_capacity(selected.selections.len());

        for selection in selected.selections {
            let endpoint = &selection.endpoint;
            let endpoint_json = serde_json::to_value(endpoint).unwrap_or_default();

            if endpoint.method != HttpMethod::GET {
                debug!(endpoint = %endpoint.identifier(), "skipping non-GET endpoint");
                records.push(json!({
                    "endpoint": endpoint_json,
                    "source": endpoint.path,
                    "response": {
                        "skipped": true,
                        "reason": format!(
                            "Método {} omitido por seguridad (solo GET automático)",
                            endpoint.method
                        ),
                    },
                }));
                continue;
            }

            let request = ApiRequest {
                headers: auth_headers.clone(),
                params: selection.query_params.clone(),
                path_params: selection.path_params.clone(),
                ..ApiRequest::get(endpoint.url.clone())
            };

            let response = match self.api.execute_request(&request).await {
                Ok(response) => {
                    debug!(endpoint = %endpoint.identifier(), status = response.status_code, "endpoint fetched");
                    serde_json::to_value(&response).unwrap_or_default()
                }
                Err(e) => {
                    warn!(endpoint = %endpoint.identifier(), error = %e, "endpoint request failed");
                    json!({ "error": e.to_string() })
                }
            };

            records.push(json!({
                "endpoint": endpoint_json,
                "source": endpoint.path,
                "response": response,
            }));
        }

        DataFetched { records }
    }

    pub async fn analyze(&self, fetched: DataFetched, user_query: &str) -> StageResult<ApiAnalyzed> {
        if fetched.records.is_empty() {
            return Ok(ApiAnalyzed {
                records: fetched.records,
                analysis: NO_DATA_ANALYSIS.to_string(),
            });
        }

        let prompt = DataAnalyzer::build_analysis_prompt(user_query, &fetched.records);
        let analysis = self
            .llm
            .complete(&api_analysis_messages(prompt))
            .await
            .map_err(|e| {
                StageFailure::new(
                    PipelineStep::AnalysisComplete,
                    format!("Error analizando datos: {}", QueryBridgeError::from(e)),
                )
            })?;

        Ok(ApiAnalyzed {
            records: fetched.records,
            analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::endpoint;
    use serde_json::json;

    fn catalog() -> Vec<ApiEndpoint> {
        vec![
            endpoint(HttpMethod::GET, "/users", Some("listUsers")),
            endpoint(HttpMethod::POST, "/users", Some("createUser")),
            endpoint(HttpMethod::GET, "/users/{id}", None),
        ]
    }

    #[test]
    fn test_summary_lines() {
        let mut endpoints = catalog();
        endpoints[0].summary = "List users".to_string();
        endpoints[0].tags = vec!["users".to_string(), "admin".to_string()];
        endpoints[2].description = "x".repeat(150);

        let summary = endpoints_summary(&endpoints);
        let lines: Vec<&str> = summary.lines().collect();

        assert_eq!(lines[0], "- GET /users (id: listUsers) - List users [tags: users, admin]");
        assert_eq!(lines[1], "- POST /users (id: createUser)");
        assert_eq!(lines[2], format!("- GET /users/{{id}} - {}", "x".repeat(100)));
    }

    #[test]
    fn test_match_by_operation_id_then_path_and_method() {
        let selections = vec![
            json!({"path": "/users", "method": "POST"}),
            json!("listUsers"),
            json!({"path": "/missing"}),
        ];
        let matched = match_selections(&selections, &catalog());

        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].endpoint.operation_id.as_deref(), Some("createUser"));
        assert_eq!(matched[1].endpoint.operation_id.as_deref(), Some("listUsers"));
    }

    #[test]
    fn test_method_string_form_and_lowercase_method() {
        let selections = vec![json!("POST /users"), json!({"path": "/users/{id}", "method": "get"})];
        let matched = match_selections(&selections, &catalog());

        assert_eq!(matched[0].endpoint.method, HttpMethod::POST);
        assert_eq!(matched[1].endpoint.path, "/users/{id}");
    }

    #[test]
    fn test_duplicates_are_kept_once() {
        let selections = vec![
            json!("listUsers"),
            json!({"path": "/users", "method": "GET"}),
            json!("GET /users"),
        ];
        assert_eq!(match_selections(&selections, &catalog()).len(), 1);
    }

    #[test]
    fn test_selection_arguments_are_stringified() {
        let selections = vec![json!({
            "path": "/users/{id}",
            "method": "GET",
            "path_params": {"id": 7},
            "query_params": {"expand": true, "ignored": {"nested": 1}}
        })];
        let matched = match_selections(&selections, &catalog());

        assert_eq!(matched[0].path_params.get("id").map(String::as_str), Some("7"));
        assert_eq!(matched[0].query_params.get("expand").map(String::as_str), Some("true"));
        assert!(!matched[0].query_params.contains_key("ignored"));
    }

    #[test]
    fn test_path_without_method_matches_first_endpoint() {
        let matched = match_selections(&[json!({"path": "/users"})], &catalog());
        assert_eq!(matched[0].endpoint.method, HttpMethod::GET);
    }

    #[test]
    fn test_operation_id_beats_earlier_path_match() {
        let endpoints = vec![
            endpoint(HttpMethod::GET, "/users", Some("listUsers")),
            endpoint(HttpMethod::GET, "/users/{id}", Some("getUser")),
        ];
        let matched = match_selections(
            &[json!({"operation_id": "getUser", "path": "/users"})],
            &endpoints,
        );

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].endpoint.operation_id.as_deref(), Some("getUser"));
    }

    #[test]
    fn test_unknown_operation_id_falls_back_to_path() {
        let matched = match_selections(
            &[json!({"operationId": "nope", "path": "/users", "method": "POST"})],
            &catalog(),
        );
        assert_eq!(matched[0].endpoint.operation_id.as_deref(), Some("createUser"));
    }
}
