// HTTP handlers for the query server
// Payloads are validated into commands here; query failures still answer 200 with an error result

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::auth::{AuthConfig, AuthParts, AuthType, Headers, OAuth2Config, OAuth2GrantType};
use crate::models::command::{DEFAULT_MAX_ENDPOINTS, DEFAULT_MAX_TABLES};
use crate::models::{ApiQueryCommand, DatabaseQueryCommand, QueryResult};
use crate::service::QueryService;
use crate::Result;

/// Shared state for the query routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn QueryService>,
}

fn default_max_tables() -> usize {
    DEFAULT_MAX_TABLES
}

fn default_max_endpoints() -> usize {
    DEFAULT_MAX_ENDPOINTS
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseQueryPayload {
    pub database_url: String,
    pub query: String,
    #[serde(default = "default_max_tables")]
    pub max_tables: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl DatabaseQueryPayload {
    pub fn into_command(self) -> Result<DatabaseQueryCommand> {
        let mut builder =
            DatabaseQueryCommand::builder(self.database_url, self.query).max_tables(self.max_tables);
        if let Some(secs) = self.timeout_secs {
            builder = builder.query_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}

/// OAuth2 client settings as sent by callers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuth2Payload {
    pub token_url: String,
    #[serde(default)]
    pub grant_type: OAuth2GrantType,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub audience: Option<String>,
    /// Provider-specific token request fields; reserved names are rejected
    #[serde(default)]
    pub extra_params: BTreeMap<String, String>,
}

impl OAuth2Payload {
    pub fn into_config(self) -> Result<OAuth2Config> {
        let mut builder = OAuth2Config::builder(self.token_url)
            .grant_type(self.grant_type)
            .scopes(self.scopes);
        if let Some(client_id) = self.client_id {
            builder = builder.client_id(client_id);
        }
        if let Some(client_secret) = self.client_secret {
            builder = builder.client_secret(client_secret);
        }
        if let Some(username) = self.username {
            builder = builder.username(username);
        }
        if let Some(password) = self.password {
            builder = builder.password(password);
        }
        if let Some(audience) = self.audience {
            builder = builder.audience(audience);
        }
        for (key, value) in self.extra_params {
            builder = builder.extra_param(key, value);
        }
        builder.build()
    }
}

/// Flat auth settings; only the fields for `auth_type` are read
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthPayload {
    #[serde(default)]
    pub auth_type: AuthType,
    pub token: Option<String>,
    pub api_key: Option<String>,
    pub api_key_header: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub oauth2: Option<OAuth2Payload>,
}

impl AuthPayload {
    pub fn into_auth_config(self) -> Result<AuthConfig> {
        let oauth2 = match (self.auth_type, self.oauth2) {
            (AuthType::OAuth2, Some(payload)) => Some(payload.into_config()?),
            _ => None,
        };

        AuthConfig::from_parts(
            self.auth_type,
            AuthParts {
                token: self.token,
                api_key: self.api_key,
                api_key_header: self.api_key_header,
                username: self.username,
                password: self.password,
                oauth2,
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiQueryPayload {
    pub swagger_url: String,
    pub query: String,
    #[serde(default)]
    pub auth: Option<AuthPayload>,
    #[serde(default = "default_max_endpoints")]
    pub max_endpoints: usize,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ApiQueryPayload {
    pub fn into_command(self) -> Result<ApiQueryCommand> {
        let auth = self.auth.unwrap_or_default().into_auth_config()?;
        let mut builder = ApiQueryCommand::builder(self.swagger_url, self.query)
            .auth(auth)
            .max_endpoints(self.max_endpoints)
            .headers(self.headers);
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}

fn unprocessable(message: String) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": message }))).into_response()
}

fn result_response(outcome: std::result::Result<QueryResult, tokio::task::JoinError>) -> Response {
    match outcome {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            error!(error = %e, "query task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// POST /api/v1/database/query
pub async fn query_database(
    State(state): State<AppState>,
    Json(payload): Json<DatabaseQueryPayload>,
) -> Response {
    let command = match payload.into_command() {
        Ok(command) => command,
        Err(e) => return unprocessable(e.to_string()),
    };
    info!(max_tables = command.max_tables(), "database query received");

    // Each query gets its own task so slow backends never serialize requests
    let service = state.service.clone();
    let outcome =
        tokio::spawn(async move { service.execute_database_query(&command).await }).await;
    result_response(outcome)
}

/// POST /api/v1/api/query
pub async fn query_api(
    State(state): State<AppState>,
    Json(payload): Json<ApiQueryPayload>,
) -> Response {
    let command = match payload.into_command() {
        Ok(command) => command,
        Err(e) => return unprocessable(e.to_string()),
    };
    info!(
        swagger_url = command.swagger_url(),
        auth_type = %command.auth().auth_type(),
        "api query received"
    );

    let service = state.service.clone();
    let outcome = tokio::spawn(async move { service.execute_api_query(&command).await }).await;
    result_response(outcome)
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "query-bridge",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_database_payload_defaults() {
        let payload: DatabaseQueryPayload = serde_json::from_value(json!({
            "database_url": "postgresql://localhost/shop",
            "query": "pedidos"
        }))
        .unwrap();

        let command = payload.into_command().unwrap();
        assert_eq!(command.max_tables(), DEFAULT_MAX_TABLES);
        assert!(command.query_timeout().is_none());
    }

    #[test]
    fn test_oauth2_payload_builds_config() {
        let payload: ApiQueryPayload = serde_json::from_value(json!({
            "swagger_url": "https://api.example.com/swagger.json",
            "query": "productos",
            "auth": {
                "auth_type": "oauth2",
                "oauth2": {
                    "token_url": "https://auth.example.com/oauth/token",
                    "client_id": "my-app",
                    "client_secret": "secret123",
                    "scopes": ["read:products"]
                }
            },
            "headers": {"X-Tenant": "acme"}
        }))
        .unwrap();

        let command = payload.into_command().unwrap();
        assert!(command.requires_oauth2());
        assert_eq!(command.max_endpoints(), DEFAULT_MAX_ENDPOINTS);
        assert_eq!(command.extra_headers().get("X-Tenant").unwrap(), "acme");
        match command.auth() {
            AuthConfig::OAuth2(config) => {
                assert_eq!(config.grant_type(), OAuth2GrantType::ClientCredentials);
                assert_eq!(config.scopes(), ["read:products".to_string()]);
            }
            other => panic!("unexpected auth: {:?}", other),
        }
    }

    #[test]
    fn test_oauth2_extra_params_reach_token_request() {
        let payload: OAuth2Payload = serde_json::from_value(json!({
            "token_url": "https://auth.example.com/token",
            "client_id": "svc",
            "client_secret": "s3cret",
            "extra_params": {"resource": "https://api.example.com"}
        }))
        .unwrap();

        let config = payload.into_config().unwrap();
        assert_eq!(
            config.extra_params().get("resource").map(String::as_str),
            Some("https://api.example.com")
        );
        assert!(config
            .token_request_params()
            .contains(&("resource".to_string(), "https://api.example.com".to_string())));
    }

    #[test]
    fn test_reserved_extra_param_is_rejected() {
        let payload = OAuth2Payload {
            token_url: "https://auth.example.com/token".to_string(),
            client_id: Some("svc".to_string()),
            client_secret: Some("s3cret".to_string()),
            extra_params: BTreeMap::from([("grant_type".to_string(), "password".to_string())]),
            ..Default::default()
        };
        assert!(payload.into_config().is_err());
    }

    #[test]
    fn test_oauth2_without_config_is_rejected() {
        let payload = AuthPayload {
            auth_type: AuthType::OAuth2,
            ..Default::default()
        };
        assert!(payload.into_auth_config().is_err());
    }

    #[test]
    fn test_password_grant_requires_credentials() {
        let payload = OAuth2Payload {
            token_url: "https://auth.example.com/token".to_string(),
            grant_type: OAuth2GrantType::Password,
            client_id: Some("app".to_string()),
            ..Default::default()
        };
        assert!(payload.into_config().is_err());
    }
}
