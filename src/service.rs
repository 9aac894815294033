// Query service
// Front ends (HTTP server, CLI) talk to this; it owns the wired handlers

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::auth::oauth2::{OAuth2Manager, OAuth2TokenProvider};
use crate::auth::resolver::AuthHeaderResolver;
use crate::config::Settings;
use crate::database::postgres::PostgresRepository;
use crate::database::DatabaseRepository;
use crate::handlers::{ApiQueryHandler, DatabaseQueryHandler};
use crate::llm::openai::{OpenAIClient, OpenAIConfig};
use crate::llm::LanguageModel;
use crate::models::{ApiQueryCommand, DatabaseQueryCommand, QueryResult};
use crate::openapi::http::HttpApiRepository;
use crate::openapi::ApiRepository;
use crate::pipeline::api::ApiPipeline;
use crate::pipeline::database::DatabasePipeline;
use crate::{QueryBridgeError, Result};

/// Entry point for both query flavours. Never fails: errors come back inside the result.
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn execute_database_query(&self, command: &DatabaseQueryCommand) -> QueryResult;

    async fn execute_api_query(&self, command: &ApiQueryCommand) -> QueryResult;
}

pub struct QueryServiceImpl {
    database: DatabaseQueryHandler,
    api: ApiQueryHandler,
}

#[async_trait]
impl QueryService for QueryServiceImpl {
    async fn execute_database_query(&self, command: &DatabaseQueryCommand) -> QueryResult {
        self.database.handle(command).await
    }

    async fn execute_api_query(&self, command: &ApiQueryCommand) -> QueryResult {
        self.api.handle(command).await
    }
}

/// Wires collaborators into a [`QueryServiceImpl`].
///
/// Only the language model is mandatory; the database, API and OAuth2 collaborators default
/// to the Postgres, reqwest and token-manager implementations.
#[derive(Default)]
pub struct QueryServiceBuilder {
    llm: Option<Arc<dyn LanguageModel>>,
    database: Option<Arc<dyn DatabaseRepository>>,
    api: Option<Arc<dyn ApiRepository>>,
    oauth2: Option<Arc<dyn OAuth2TokenProvider>>,
}

impl QueryServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Production collaborators configured from `settings`
    pub fn from_settings(settings: &Settings) -> Self {
        let llm = OpenAIClient::new(OpenAIConfig {
            api_key: settings.openai_api_key.clone(),
            base_url: settings.openai_base_url.clone(),
            model: settings.openai_model.clone(),
            temperature: settings.llm_temperature,
            ..Default::default()
        });

        Self::new()
            .with_llm(Arc::new(llm))
            .with_database(Arc::new(PostgresRepository::new()))
            .with_api(Arc::new(HttpApiRepository::new(
                settings.http_timeout(),
                settings.spec_probe_timeout(),
            )))
            .with_oauth2_provider(Arc::new(OAuth2Manager::with_timeout(settings.oauth2_timeout())))
    }

    pub fn with_llm(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_database(mut self, database: Arc<dyn DatabaseRepository>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_api(mut self, api: Arc<dyn ApiRepository>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_oauth2_provider(mut self, provider: Arc<dyn OAuth2TokenProvider>) -> Self {
        self.oauth2 = Some(provider);
        self
    }

    pub fn build(self) -> Result<QueryServiceImpl> {
        let llm = self.llm.ok_or_else(|| {
            QueryBridgeError::Configuration("a language model is required".to_string())
        })?;
        let database = self
            .database
            .unwrap_or_else(|| Arc::new(PostgresRepository::new()));
        let api = self
            .api
            .unwrap_or_else(|| Arc::new(HttpApiRepository::default()));
        let oauth2 = self
            .oauth2
            .unwrap_or_else(|| Arc::new(OAuth2Manager::default()));

        info!(model = llm.model_name(), "query service ready");

        Ok(QueryServiceImpl {
            database: DatabaseQueryHandler::new(DatabasePipeline::new(database, llm.clone())),
            api: ApiQueryHandler::new(
                ApiPipeline::new(api, llm),
                AuthHeaderResolver::with_oauth2_provider(oauth2),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, OAuth2Config};
    use crate::models::QueryStatus;
    use crate::openapi::HttpMethod;
    use crate::test_support::{
        endpoint, CountingTokenEndpoint, InMemoryDatabase, RecordingApiRepository,
        ScriptedLanguageModel,
    };
    use serde_json::json;

    #[test]
    fn test_language_model_is_required() {
        let err = QueryServiceBuilder::new().build().err().unwrap();
        assert!(matches!(err, QueryBridgeError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_database_query_through_service() {
        let service = QueryServiceBuilder::new()
            .with_llm(Arc::new(
                ScriptedLanguageModel::new()
                    .reply(r#"{"queries": [{"table": "users", "sql": "SELECT * FROM users"}]}"#)
                    .reply("Dos usuarios."),
            ))
            .with_database(Arc::new(
                InMemoryDatabase::with_tables(&["users"])
                    .with_rows("users", vec![json!({"id": 1}), json!({"id": 2})]),
            ))
            .build()
            .unwrap();

        let command = DatabaseQueryCommand::new("postgresql://localhost/app", "users").unwrap();
        let result = service.execute_database_query(&command).await;

        assert_eq!(result.status, QueryStatus::Success);
        assert_eq!(result.response_text, "Dos usuarios.");
    }

    #[tokio::test]
    async fn test_oauth2_provider_is_wired_into_api_handler() {
        let tokens = Arc::new(CountingTokenEndpoint::returning(
            json!({"access_token": "abc", "expires_in": 3600}),
        ));
        let api = Arc::new(RecordingApiRepository::with_endpoints(vec![endpoint(
            HttpMethod::GET,
            "/status",
            None,
        )]));
        let service = QueryServiceBuilder::new()
            .with_llm(Arc::new(
                ScriptedLanguageModel::new()
                    .reply(r#"{"endpoints": ["GET /status"]}"#)
                    .reply("Todo bien."),
            ))
            .with_api(api.clone())
            .with_oauth2_provider(Arc::new(OAuth2Manager::new(tokens.clone())))
            .build()
            .unwrap();

        let config =
            OAuth2Config::client_credentials("https://auth.example.com/token", "svc", "s3cret")
                .unwrap();
        let command = ApiQueryCommand::builder("https://api.example.com/docs", "estado")
            .auth(AuthConfig::oauth2(config))
            .build()
            .unwrap();

        let result = service.execute_api_query(&command).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(tokens.total_calls(), 1);
        assert_eq!(api.requests()[0].headers.get("Authorization").unwrap(), "Bearer abc");
    }
}
