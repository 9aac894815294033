// OAuth2 token lifecycle management
// Caches tokens per credential identity, refreshes before re-obtaining, and talks to
// token endpoints through a swappable transport

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::credentials::{OAuth2Config, OAuth2Token};

/// Failure while exchanging credentials or refreshing a token.
///
/// `error_code` carries the provider's `error` field (e.g. `invalid_client`) when the
/// endpoint sent one; network failures leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct OAuth2Error {
    pub message: String,
    pub error_code: Option<String>,
}

impl OAuth2Error {
    pub fn new(message: impl Into<String>, error_code: Option<String>) -> Self {
        Self {
            message: message.into(),
            error_code,
        }
    }
}

/// Raw reply from a token endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEndpointResponse {
    pub status: u16,
    pub body: Value,
}

impl TokenEndpointResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport for `application/x-www-form-urlencoded` token requests
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn exchange(
        &self,
        token_url: &str,
        form: &[(String, String)],
    ) -> Result<TokenEndpointResponse, OAuth2Error>;
}

/// reqwest-backed token endpoint transport
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    client: Client,
    timeout: Duration,
}

impl HttpTokenEndpoint {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

impl Default for HttpTokenEndpoint {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange(
        &self,
        token_url: &str,
        form: &[(String, String)],
    ) -> Result<TokenEndpointResponse, OAuth2Error> {
        let response = self
            .client
            .post(token_url)
            .header("Accept", "application/json")
            .form(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| OAuth2Error::new(format!("Token request failed: {}", e), None))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| OAuth2Error::new(format!("Failed to read token response: {}", e), None))?;

        let body = match serde_json::from_str::<Value>(&text) {
            Ok(body) => body,
            Err(_) if !(200..300).contains(&status) => Value::Null,
            Err(e) => {
                return Err(OAuth2Error::new(
                    format!("Token endpoint returned a non-JSON body: {}", e),
                    None,
                ))
            }
        };

        Ok(TokenEndpointResponse { status, body })
    }
}

/// Identity of a credential set; tokens are cached per key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenCacheKey {
    pub token_url: String,
    pub client_id: Option<String>,
    pub username: Option<String>,
}

impl From<&OAuth2Config> for TokenCacheKey {
    fn from(config: &OAuth2Config) -> Self {
        Self {
            token_url: config.token_url().to_string(),
            client_id: config.client_id().map(str::to_string),
            username: config.username().map(str::to_string),
        }
    }
}

/// Token acquisition contract used by the auth header resolver
#[async_trait]
pub trait OAuth2TokenProvider: Send + Sync {
    /// Full credential exchange; overwrites the cache entry on success
    async fn obtain_token(&self, config: &OAuth2Config) -> Result<OAuth2Token, OAuth2Error>;

    /// Refresh-token exchange; fails fast when `current` has no refresh token
    async fn refresh_token(
        &self,
        config: &OAuth2Config,
        current: &OAuth2Token,
    ) -> Result<OAuth2Token, OAuth2Error>;

    /// Cached → supplied → refresh → obtain
    async fn get_valid_token(
        &self,
        config: &OAuth2Config,
        current: Option<&OAuth2Token>,
    ) -> Result<OAuth2Token, OAuth2Error>;

    fn clear_cache(&self);
}

/// OAuth2 token manager shared by every pipeline in the process
pub struct OAuth2Manager {
    endpoint: Arc<dyn TokenEndpoint>,
    cache: DashMap<TokenCacheKey, OAuth2Token>,
}

impl OAuth2Manager {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            endpoint,
            cache: DashMap::new(),
        }
    }

    /// Manager over the default HTTP transport
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Arc::new(HttpTokenEndpoint::new(timeout)))
    }

    pub fn cached_token(&self, config: &OAuth2Config) -> Option<OAuth2Token> {
        self.cache
            .get(&TokenCacheKey::from(config))
            .map(|entry| entry.value().clone())
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    async fn exchange(
        &self,
        config: &OAuth2Config,
        form: &[(String, String)],
    ) -> Result<OAuth2Token, OAuth2Error> {
        let response = self.endpoint.exchange(config.token_url(), form).await?;

        if !response.is_success() {
            let error_code = response
                .body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string);
            let detail = response
                .body
                .get("error_description")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| error_code.clone())
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            warn!(
                token_url = config.token_url(),
                status = response.status,
                "token endpoint rejected the request"
            );
            return Err(OAuth2Error::new(
                format!("Token request failed: {}", detail),
                error_code,
            ));
        }

        OAuth2Token::from_response(&response.body)
    }
}

impl Default for OAuth2Manager {
    fn default() -> Self {
        Self::new(Arc::new(HttpTokenEndpoint::default()))
    }
}

#[async_trait]
impl OAuth2TokenProvider for OAuth2Manager {
    async fn obtain_token(&self, config: &OAuth2Config) -> Result<OAuth2Token, OAuth2Error> {
        debug!(
            token_url = config.token_url(),
            grant_type = %config.grant_type(),
            "obtaining OAuth2 token"
        );

        let token = self
            .exchange(config, &config.token_request_params())
            .await?;
        self.cache.insert(TokenCacheKey::from(config), token.clone());

        info!(token_url = config.token_url(), "OAuth2 token obtained");
        Ok(token)
    }

    async fn refresh_token(
        &self,
        config: &OAuth2Config,
        current: &OAuth2Token,
    ) -> Result<OAuth2Token, OAuth2Error> {
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuth2Error::new("No refresh token available", None))?;

        debug!(token_url = config.token_url(), "refreshing OAuth2 token");

        let mut token = self
            .exchange(config, &config.refresh_request_params(refresh_token))
            .await?;

        // Providers may rotate only the access token
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }

        self.cache.insert(TokenCacheKey::from(config), token.clone());
        info!(token_url = config.token_url(), "OAuth2 token refreshed");
        Ok(token)
    }

    async fn get_valid_token(
        &self,
        config: &OAuth2Config,
        current: Option<&OAuth2Token>,
    ) -> Result<OAuth2Token, OAuth2Error> {
        let cached = self.cached_token(config);

        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            debug!(token_url = config.token_url(), "using cached OAuth2 token");
            return Ok(token.clone());
        }

        if let Some(token) = current.filter(|t| !t.is_expired()) {
            return Ok(token.clone());
        }

        let refreshable = current
            .filter(|t| t.refresh_token.is_some())
            .or_else(|| cached.as_ref().filter(|t| t.refresh_token.is_some()));

        if let Some(token) = refreshable {
            match self.refresh_token(config, token).await {
                Ok(refreshed) => return Ok(refreshed),
                Err(e) => warn!(
                    token_url = config.token_url(),
                    error = %e,
                    "token refresh failed, falling back to a fresh exchange"
                ),
            }
        }

        self.obtain_token(config).await
    }

    fn clear_cache(&self) {
        self.cache.clear();
        debug!("OAuth2 token cache cleared");
    }
}
