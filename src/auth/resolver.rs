//! Auth header resolution.
//!
//! Turns an [`AuthConfig`] into the headers an outbound request needs.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tracing::debug;

use super::oauth2::OAuth2TokenProvider;
use super::{AuthConfig, Headers};
use crate::{QueryBridgeError, Result};

/// Resolves auth configuration to request headers.
///
/// OAuth2 needs a token provider; without one an OAuth2 config is an error rather
/// than an unauthenticated request.
#[derive(Clone, Default)]
pub struct AuthHeaderResolver {
    oauth2: Option<Arc<dyn OAuth2TokenProvider>>,
}

impl AuthHeaderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_oauth2_provider(provider: Arc<dyn OAuth2TokenProvider>) -> Self {
        Self {
            oauth2: Some(provider),
        }
    }

    pub async fn resolve(&self, auth: &AuthConfig) -> Result<Headers> {
        let mut headers = Headers::new();

        match auth {
            AuthConfig::None => {}
            AuthConfig::Bearer { token } => {
                if let Some(token) = token {
                    headers.insert("Authorization".to_string(), format!("Bearer {}", token));
                }
            }
            AuthConfig::ApiKey {
                api_key,
                header_name,
            } => {
                if let Some(api_key) = api_key {
                    headers.insert(header_name.clone(), api_key.clone());
                }
            }
            AuthConfig::Basic { username, password } => {
                if let (Some(username), Some(password)) = (username, password) {
                    let encoded = STANDARD.encode(format!("{}:{}", username, password));
                    headers.insert("Authorization".to_string(), format!("Basic {}", encoded));
                }
            }
            AuthConfig::OAuth2(config) => {
                let provider = self.oauth2.as_ref().ok_or_else(|| {
                    QueryBridgeError::Configuration(
                        "OAuth2 authentication requested but no OAuth2 token provider is configured"
                            .to_string(),
                    )
                })?;
                let token = provider.get_valid_token(config, None).await?;
                let (name, value) = token.as_header();
                headers.insert(name, value);
            }
        }

        debug!(
            auth_type = %auth.auth_type(),
            header_count = headers.len(),
            "resolved auth headers"
        );
        Ok(headers)
    }

    /// Auth headers with caller-supplied headers layered on top
    pub async fn resolve_with_extra(&self, auth: &AuthConfig, extra: &Headers) -> Result<Headers> {
        let mut headers = self.resolve(auth).await?;
        headers.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(headers)
    }
}
