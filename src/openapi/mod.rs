//! OpenAPI / Swagger discovery and HTTP execution
//!
//! [`ApiRepository`] is the collaborator the API pipeline talks to. [`http`] implements it
//! with reqwest; [`parser`] and [`discovery`] hold the pure parts (spec parsing and
//! Swagger UI handling) so they can be tested without a network.

pub mod discovery;
pub mod http;
pub mod parser;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::auth::Headers;
use crate::Result;

/// HTTP methods an OpenAPI operation can use
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    pub fn parse(method: &str) -> Option<Self> {
        match method.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "PATCH" => Some(HttpMethod::PATCH),
            "DELETE" => Some(HttpMethod::DELETE),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::GET => reqwest::Method::GET,
            HttpMethod::POST => reqwest::Method::POST,
            HttpMethod::PUT => reqwest::Method::PUT,
            HttpMethod::PATCH => reqwest::Method::PATCH,
            HttpMethod::DELETE => reqwest::Method::DELETE,
            HttpMethod::HEAD => reqwest::Method::HEAD,
            HttpMethod::OPTIONS => reqwest::Method::OPTIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn parse(location: &str) -> Option<Self> {
        match location {
            "path" => Some(ParameterLocation::Path),
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            "cookie" => Some(ParameterLocation::Cookie),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiParameter {
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub param_type: Option<String>,
    pub description: String,
}

/// Parameters of one operation, grouped by where they travel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupedParameters {
    pub path: Vec<ApiParameter>,
    pub query: Vec<ApiParameter>,
    pub header: Vec<ApiParameter>,
    pub cookie: Vec<ApiParameter>,
}

impl GroupedParameters {
    pub fn for_location(&self, location: ParameterLocation) -> &[ApiParameter] {
        match location {
            ParameterLocation::Path => &self.path,
            ParameterLocation::Query => &self.query,
            ParameterLocation::Header => &self.header,
            ParameterLocation::Cookie => &self.cookie,
        }
    }

    fn for_location_mut(&mut self, location: ParameterLocation) -> &mut Vec<ApiParameter> {
        match location {
            ParameterLocation::Path => &mut self.path,
            ParameterLocation::Query => &mut self.query,
            ParameterLocation::Header => &mut self.header,
            ParameterLocation::Cookie => &mut self.cookie,
        }
    }

    /// Insert or replace by name within the location
    pub fn upsert(&mut self, location: ParameterLocation, parameter: ApiParameter) {
        let bucket = self.for_location_mut(location);
        match bucket.iter_mut().find(|p| p.name == parameter.name) {
            Some(existing) => *existing = parameter,
            None => bucket.push(parameter),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty() && self.query.is_empty() && self.header.is_empty() && self.cookie.is_empty()
    }
}

/// One operation from an OpenAPI document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub path: String,
    pub url: String,
    pub method: HttpMethod,
    pub summary: String,
    pub description: String,
    pub operation_id: Option<String>,
    pub tags: Vec<String>,
    pub parameters: GroupedParameters,
    pub request_body_schema: Option<Value>,
    pub requires_auth: bool,
    pub security: Vec<Value>,
    pub responses: Vec<String>,
}

impl ApiEndpoint {
    /// `GET /users`
    pub fn identifier(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Outbound request built by the API pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub params: HashMap<String, String>,
    pub json: Option<Value>,
    pub path_params: HashMap<String, String>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::GET,
            url: url.into(),
            headers: Headers::new(),
            params: HashMap::new(),
            json: None,
            path_params: HashMap::new(),
        }
    }

    /// URL with `{name}` placeholders replaced by path params
    pub fn resolved_url(&self) -> String {
        self.path_params
            .iter()
            .fold(self.url.clone(), |url, (key, value)| {
                url.replace(&format!("{{{}}}", key), value)
            })
    }
}

/// Response captured per endpoint.
///
/// Failures are data: an HTTP error keeps its real status, a network failure is status 0,
/// and in both cases `data` is null and `error` explains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn ok(status_code: u16, headers: HashMap<String, String>, data: Value) -> Self {
        Self {
            status_code,
            headers: Some(headers),
            error: None,
            data: Some(data),
        }
    }

    pub fn failed(status_code: u16, error: impl Into<String>) -> Self {
        Self {
            status_code,
            headers: None,
            error: Some(error.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status_code)
    }
}

/// HTTP/API collaborator used by the API pipeline
#[async_trait]
pub trait ApiRepository: Send + Sync {
    /// Fetch and parse the OpenAPI document reachable from `url`
    async fn discover_endpoints(&self, url: &str, headers: &Headers) -> Result<Vec<ApiEndpoint>>;

    /// Execute one request; HTTP and network failures come back inside [`ApiResponse`]
    async fn execute_request(&self, request: &ApiRequest) -> Result<ApiResponse>;
}
