// Query commands
// Validated eagerly: an invalid command never reaches a pipeline

use std::time::Duration;

use crate::auth::{AuthConfig, Headers};
use crate::{QueryBridgeError, Result};

pub const DEFAULT_MAX_TABLES: usize = 10;
pub const MAX_TABLES_LIMIT: usize = 10;
pub const DEFAULT_MAX_ENDPOINTS: usize = 5;
pub const MAX_ENDPOINTS_LIMIT: usize = 20;

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(QueryBridgeError::Configuration(format!("{} is required", field)));
    }
    Ok(())
}

fn require_range(value: usize, max: usize, field: &str) -> Result<()> {
    if !(1..=max).contains(&value) {
        return Err(QueryBridgeError::Configuration(format!(
            "{} must be between 1 and {}",
            field, max
        )));
    }
    Ok(())
}

fn require_positive(timeout: Option<Duration>, field: &str) -> Result<()> {
    if timeout.map_or(false, |t| t.is_zero()) {
        return Err(QueryBridgeError::Configuration(format!(
            "{} must be positive when provided",
            field
        )));
    }
    Ok(())
}

/// Natural-language question against a relational database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseQueryCommand {
    database_url: String,
    user_query: String,
    max_tables: usize,
    query_timeout: Option<Duration>,
}

impl DatabaseQueryCommand {
    pub fn builder(
        database_url: impl Into<String>,
        user_query: impl Into<String>,
    ) -> DatabaseQueryCommandBuilder {
        DatabaseQueryCommandBuilder {
            database_url: database_url.into(),
            user_query: user_query.into(),
            max_tables: DEFAULT_MAX_TABLES,
            query_timeout: None,
        }
    }

    /// Command with default bounds
    pub fn new(database_url: impl Into<String>, user_query: impl Into<String>) -> Result<Self> {
        Self::builder(database_url, user_query).build()
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    pub fn max_tables(&self) -> usize {
        self.max_tables
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseQueryCommandBuilder {
    database_url: String,
    user_query: String,
    max_tables: usize,
    query_timeout: Option<Duration>,
}

impl DatabaseQueryCommandBuilder {
    pub fn max_tables(mut self, max_tables: usize) -> Self {
        self.max_tables = max_tables;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<DatabaseQueryCommand> {
        require(&self.database_url, "database_url")?;
        require(&self.user_query, "user_query")?;
        require_range(self.max_tables, MAX_TABLES_LIMIT, "max_tables")?;
        require_positive(self.query_timeout, "query_timeout")?;

        Ok(DatabaseQueryCommand {
            database_url: self.database_url,
            user_query: self.user_query,
            max_tables: self.max_tables,
            query_timeout: self.query_timeout,
        })
    }
}

/// Natural-language question against an OpenAPI-described HTTP API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiQueryCommand {
    swagger_url: String,
    user_query: String,
    auth: AuthConfig,
    max_endpoints: usize,
    extra_headers: Headers,
    timeout: Option<Duration>,
}

impl ApiQueryCommand {
    pub fn builder(
        swagger_url: impl Into<String>,
        user_query: impl Into<String>,
    ) -> ApiQueryCommandBuilder {
        ApiQueryCommandBuilder {
            swagger_url: swagger_url.into(),
            user_query: user_query.into(),
            auth: AuthConfig::None,
            max_endpoints: DEFAULT_MAX_ENDPOINTS,
            extra_headers: Headers::new(),
            timeout: None,
        }
    }

    pub fn new(swagger_url: impl Into<String>, user_query: impl Into<String>) -> Result<Self> {
        Self::builder(swagger_url, user_query).build()
    }

    pub fn swagger_url(&self) -> &str {
        &self.swagger_url
    }

    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    pub fn max_endpoints(&self) -> usize {
        self.max_endpoints
    }

    pub fn extra_headers(&self) -> &Headers {
        &self.extra_headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn requires_oauth2(&self) -> bool {
        self.auth.requires_oauth2()
    }
}

#[derive(Debug, Clone)]
pub struct ApiQueryCommandBuilder {
    swagger_url: String,
    user_query: String,
    auth: AuthConfig,
    max_endpoints: usize,
    extra_headers: Headers,
    timeout: Option<Duration>,
}

impl ApiQueryCommandBuilder {
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn max_endpoints(mut self, max_endpoints: usize) -> Self {
        self.max_endpoints = max_endpoints;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.extra_headers.extend(headers);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<ApiQueryCommand> {
        require(&self.swagger_url, "swagger_url")?;
        require(&self.user_query, "user_query")?;
        require_range(self.max_endpoints, MAX_ENDPOINTS_LIMIT, "max_endpoints")?;
        require_positive(self.timeout, "timeout")?;

        Ok(ApiQueryCommand {
            swagger_url: self.swagger_url,
            user_query: self.user_query,
            auth: self.auth,
            max_endpoints: self.max_endpoints,
            extra_headers: self.extra_headers,
            timeout: self.timeout,
        })
    }
}
