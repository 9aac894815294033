// Query Bridge - Rust Edition
// Natural-language questions answered from relational databases and OpenAPI-described HTTP APIs

//! # Query Bridge Library
//!
//! This is the library root for Query Bridge. A caller hands in a validated command
//! (a database connection or an OpenAPI/Swagger URL plus a question in natural language)
//! and gets back a [`QueryResult`] with the fetched records and an LLM-written answer.
//!
//! ## Core Components
//!
//! ### Auth
//! - [`AuthConfig`]: tagged union over the supported authentication schemes
//! - [`OAuth2Manager`]: token lifecycle (cache, refresh before re-obtain, fresh exchange)
//! - [`AuthHeaderResolver`]: turns an [`AuthConfig`] into request headers
//!
//! ### Pipelines
//! - [`DatabasePipeline`]: schema → table selection → query planning → execution → analysis
//! - [`ApiPipeline`]: discovery → endpoint selection → fetch (GET only) → analysis
//!
//! Each stage consumes the previous stage's output by value and returns
//! `Result<NextStage, StageFailure>`; the driver stops on the first failure.
//!
//! ### Collaborators
//! Everything that talks to the outside world sits behind a trait so tests can swap it:
//! [`LanguageModel`], [`DatabaseRepository`], [`ApiRepository`], [`TokenEndpoint`] and
//! [`OAuth2TokenProvider`].
//!
//! ### Handlers
//! [`DatabaseQueryHandler`] and [`ApiQueryHandler`] are the only place where errors stop
//! propagating and become data: every failure ends up in [`QueryResult::error`].
//!
//! ## Rust Learning Notes:
//!
//! ### One error enum per crate
//! `QueryBridgeError` collects every failure category the crate knows about. Subsystems
//! with their own vocabulary (`LLMError`, `OAuth2Error`) keep their own types and are
//! folded in with `#[from]`, so `?` converts them automatically.

pub mod auth;
pub mod config;
pub mod database;
pub mod handlers;
pub mod llm;
pub mod models;
pub mod openapi;
pub mod pipeline;
pub mod presentation;
pub mod server;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{
    oauth2::{HttpTokenEndpoint, OAuth2Error, OAuth2Manager, OAuth2TokenProvider, TokenEndpoint},
    resolver::AuthHeaderResolver,
    AuthConfig, AuthParts, AuthType, Headers, OAuth2Config, OAuth2GrantType, OAuth2Token,
};
pub use database::{postgres::PostgresRepository, DatabaseRepository};
pub use handlers::{ApiQueryHandler, DatabaseQueryHandler};
pub use llm::{openai::OpenAIClient, LLMError, LanguageModel};
pub use models::{ApiQueryCommand, DatabaseQueryCommand, QueryResult, QueryStatus};
pub use openapi::{http::HttpApiRepository, ApiRepository};
pub use pipeline::{api::ApiPipeline, database::DatabasePipeline, PipelineStep, StageFailure};
pub use config::Settings;
pub use presentation::{OutputFormat, ResultPresenter};
pub use server::{QueryServer, QueryServerBuilder};
pub use service::{QueryService, QueryServiceBuilder, QueryServiceImpl};

/// Common error type for the crate
#[derive(Debug, thiserror::Error)]
pub enum QueryBridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("OAuth2 error: {0}")]
    OAuth2(#[from] OAuth2Error),

    #[error("LLM error: {0}")]
    Llm(#[from] LLMError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, QueryBridgeError>;
