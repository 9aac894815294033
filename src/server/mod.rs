// HTTP front end
// Exposes the query service as a small JSON API

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::service::QueryService;
use crate::{QueryBridgeError, Result};
use handlers::{health_check, not_found, query_api, query_database, AppState};

/// Query server configuration
#[derive(Clone, Debug)]
pub struct QueryServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_enabled: bool,
}

impl Default for QueryServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            cors_enabled: true,
        }
    }
}

pub struct QueryServer {
    config: QueryServerConfig,
    state: AppState,
}

impl QueryServer {
    pub fn new(config: QueryServerConfig, service: Arc<dyn QueryService>) -> Self {
        Self {
            config,
            state: AppState { service },
        }
    }

    pub fn config(&self) -> &QueryServerConfig {
        &self.config
    }

    /// Create the Axum router with all query routes
    pub fn create_router(&self) -> Router {
        let router = Router::new()
            .route("/api/v1/database/query", post(query_database))
            .route("/api/v1/api/query", post(query_api))
            .route("/health", get(health_check))
            .fallback(not_found)
            .with_state(self.state.clone());

        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Run the server until the process is stopped
    pub async fn run(self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.create_router();
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!("🔎 Query Bridge server starting");
        info!("📡 Server address: http://{}", addr);
        info!("🔗 API endpoints:");
        info!("   POST http://{}/api/v1/database/query", addr);
        info!("   POST http://{}/api/v1/api/query", addr);
        info!("   GET  http://{}/health", addr);
        info!("   CORS enabled: {}", self.config.cors_enabled);

        axum::Server::bind(&addr.parse()?)
            .serve(app.into_make_service())
            .await?;

        Ok(())
    }
}

/// Builder pattern for the query server
#[derive(Default)]
pub struct QueryServerBuilder {
    config: QueryServerConfig,
    service: Option<Arc<dyn QueryService>>,
}

impl QueryServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.config.cors_enabled = enabled;
        self
    }

    pub fn with_service(mut self, service: Arc<dyn QueryService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn build(self) -> Result<QueryServer> {
        let service = self.service.ok_or_else(|| {
            QueryBridgeError::Configuration("a query service is required".to_string())
        })?;
        Ok(QueryServer::new(self.config, service))
    }
}
