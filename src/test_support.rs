// Test doubles for the collaborator traits
// Each one records what it was asked so tests can assert on call counts and payloads

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::auth::oauth2::{OAuth2Error, TokenEndpoint, TokenEndpointResponse};
use crate::auth::Headers;
use crate::database::{DatabaseRepository, Row, TableMetadata};
use crate::llm::{ChatMessage, LLMError, LLMResult, LanguageModel};
use crate::openapi::{ApiEndpoint, ApiRepository, ApiRequest, ApiResponse, HttpMethod};
use crate::{QueryBridgeError, Result};

/// Token endpoint that answers every grant with a canned body and counts calls per grant type
pub struct CountingTokenEndpoint {
    success: Value,
    failures: HashMap<String, (u16, Value)>,
    calls: Mutex<HashMap<String, usize>>,
    last_form: Mutex<Vec<(String, String)>>,
}

impl CountingTokenEndpoint {
    pub fn returning(body: Value) -> Self {
        Self {
            success: body,
            failures: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
            last_form: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_grant(mut self, grant_type: &str, status: u16, body: Value) -> Self {
        self.failures.insert(grant_type.to_string(), (status, body));
        self
    }

    pub fn calls_for(&self, grant_type: &str) -> usize {
        self.calls.lock().unwrap().get(grant_type).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn last_form_value(&self, key: &str) -> Option<String> {
        self.last_form
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl TokenEndpoint for CountingTokenEndpoint {
    async fn exchange(
        &self,
        _token_url: &str,
        form: &[(String, String)],
    ) -> std::result::Result<TokenEndpointResponse, OAuth2Error> {
        let grant = form
            .iter()
            .find(|(k, _)| k == "grant_type")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();

        *self.calls.lock().unwrap().entry(grant.clone()).or_insert(0) += 1;
        *self.last_form.lock().unwrap() = form.to_vec();

        let (status, body) = match self.failures.get(&grant) {
            Some((status, body)) => (*status, body.clone()),
            None => (200, self.success.clone()),
        };
        Ok(TokenEndpointResponse { status, body })
    }
}

/// Language model that replays queued replies in order
#[derive(Default)]
pub struct ScriptedLanguageModel {
    replies: Mutex<VecDeque<LLMResult<String>>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, error: LLMError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// User message of every call, in order
    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|messages| messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn complete(&self, messages: &[ChatMessage]) -> LLMResult<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::InvalidRequest("no scripted reply left".to_string())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Database with fixed tables; rows are looked up by the first table name found in the SQL
#[derive(Default)]
pub struct InMemoryDatabase {
    tables: Vec<TableMetadata>,
    rows: HashMap<String, Vec<Row>>,
    failing_sql: Vec<String>,
    schema_error: Option<String>,
    executed: Mutex<Vec<String>>,
}

impl InMemoryDatabase {
    pub fn with_tables(names: &[&str]) -> Self {
        Self {
            tables: names
                .iter()
                .map(|name| TableMetadata::new(*name, Vec::new()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_rows(mut self, table: &str, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.rows.insert(table.to_string(), rows);
        self
    }

    /// Any statement containing `fragment` fails with an execution error
    pub fn failing_on(mut self, fragment: &str) -> Self {
        self.failing_sql.push(fragment.to_string());
        self
    }

    pub fn failing_schema(mut self, message: &str) -> Self {
        self.schema_error = Some(message.to_string());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseRepository for InMemoryDatabase {
    async fn describe_schema(&self, _connection: &str) -> Result<Vec<TableMetadata>> {
        match &self.schema_error {
            Some(message) => Err(QueryBridgeError::Discovery(message.clone())),
            None => Ok(self.tables.clone()),
        }
    }

    async fn fetch_rows(&self, _connection: &str, sql: &str, limit: usize) -> Result<Vec<Row>> {
        self.executed.lock().unwrap().push(sql.to_string());

        if self.failing_sql.iter().any(|fragment| sql.contains(fragment.as_str())) {
            return Err(QueryBridgeError::Execution(format!("query failed: {}", sql)));
        }

        let rows = self
            .tables
            .iter()
            .find(|table| sql.contains(table.name.as_str()))
            .and_then(|table| self.rows.get(&table.name))
            .map(|rows| rows.iter().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(rows)
    }
}

/// API repository with a fixed endpoint list that records every request it executes
#[derive(Default)]
pub struct RecordingApiRepository {
    endpoints: Vec<ApiEndpoint>,
    discovery_error: Option<String>,
    responses: HashMap<String, ApiResponse>,
    request_errors: HashMap<String, String>,
    discovery_headers: Mutex<Vec<Headers>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl RecordingApiRepository {
    pub fn with_endpoints(endpoints: Vec<ApiEndpoint>) -> Self {
        Self {
            endpoints,
            ..Self::default()
        }
    }

    pub fn failing_discovery(message: &str) -> Self {
        Self {
            discovery_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Canned response for requests whose resolved URL equals `url`
    pub fn respond(mut self, url: &str, response: ApiResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    /// Requests whose resolved URL equals `url` fail with an execution error
    pub fn failing_request(mut self, url: &str, message: &str) -> Self {
        self.request_errors.insert(url.to_string(), message.to_string());
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn discovery_headers(&self) -> Vec<Headers> {
        self.discovery_headers.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApiRepository for RecordingApiRepository {
    async fn discover_endpoints(&self, _url: &str, headers: &Headers) -> Result<Vec<ApiEndpoint>> {
        self.discovery_headers.lock().unwrap().push(headers.clone());
        match &self.discovery_error {
            Some(message) => Err(QueryBridgeError::Discovery(message.clone())),
            None => Ok(self.endpoints.clone()),
        }
    }

    async fn execute_request(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let url = request.resolved_url();
        if let Some(message) = self.request_errors.get(&url) {
            return Err(QueryBridgeError::Execution(message.clone()));
        }
        Ok(self
            .responses
            .get(&url)
            .cloned()
            .unwrap_or_else(|| ApiResponse::ok(200, HashMap::new(), serde_json::json!([]))))
    }
}

/// Endpoint fixture with only the fields selection and fetching look at
pub fn endpoint(method: HttpMethod, path: &str, operation_id: Option<&str>) -> ApiEndpoint {
    ApiEndpoint {
        path: path.to_string(),
        url: format!("https://api.example.com{}", path),
        method,
        summary: String::new(),
        description: String::new(),
        operation_id: operation_id.map(str::to_string),
        tags: Vec::new(),
        parameters: Default::default(),
        request_body_schema: None,
        requires_auth: false,
        security: Vec::new(),
        responses: Vec::new(),
    }
}
