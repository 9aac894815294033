//! Authentication for outbound API calls
//!
//! [`AuthConfig`] describes how a target API expects to be authenticated. The
//! [`resolver::AuthHeaderResolver`] turns it into headers, delegating OAuth2 to the
//! token lifecycle manager in [`oauth2`].

pub mod credentials;
pub mod oauth2;
pub mod resolver;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use credentials::{OAuth2Config, OAuth2ConfigBuilder, OAuth2GrantType, OAuth2Token};

use crate::{QueryBridgeError, Result};

/// Header name → value
pub type Headers = HashMap<String, String>;

/// Header used for API keys when none is configured
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Authentication scheme discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AuthType {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "bearer")]
    Bearer,
    #[serde(rename = "api_key")]
    ApiKey,
    #[serde(rename = "basic")]
    Basic,
    #[serde(rename = "oauth2")]
    OAuth2,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::None => "none",
            AuthType::Bearer => "bearer",
            AuthType::ApiKey => "api_key",
            AuthType::Basic => "basic",
            AuthType::OAuth2 => "oauth2",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = QueryBridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" | "" => Ok(AuthType::None),
            "bearer" => Ok(AuthType::Bearer),
            "api_key" | "apikey" => Ok(AuthType::ApiKey),
            "basic" => Ok(AuthType::Basic),
            "oauth2" => Ok(AuthType::OAuth2),
            other => Err(QueryBridgeError::Configuration(format!(
                "Unsupported auth type: {}",
                other
            ))),
        }
    }
}

/// How to authenticate against a target API.
///
/// Missing fields inside `Bearer`, `ApiKey` and `Basic` are tolerated and simply add no
/// header. `OAuth2` always carries a validated config.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        token: Option<String>,
    },
    ApiKey {
        api_key: Option<String>,
        header_name: String,
    },
    Basic {
        username: Option<String>,
        password: Option<String>,
    },
    OAuth2(Arc<OAuth2Config>),
}

impl AuthConfig {
    pub fn bearer(token: impl Into<String>) -> Self {
        AuthConfig::Bearer {
            token: Some(token.into()),
        }
    }

    pub fn api_key(api_key: impl Into<String>) -> Self {
        Self::api_key_with_header(api_key, DEFAULT_API_KEY_HEADER)
    }

    pub fn api_key_with_header(api_key: impl Into<String>, header_name: impl Into<String>) -> Self {
        AuthConfig::ApiKey {
            api_key: Some(api_key.into()),
            header_name: header_name.into(),
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        AuthConfig::Basic {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn oauth2(config: OAuth2Config) -> Self {
        AuthConfig::OAuth2(Arc::new(config))
    }

    /// Build from loosely-typed front-end inputs
    pub fn from_parts(auth_type: AuthType, parts: AuthParts) -> Result<Self> {
        let auth = match auth_type {
            AuthType::None => AuthConfig::None,
            AuthType::Bearer => AuthConfig::Bearer { token: parts.token },
            AuthType::ApiKey => AuthConfig::ApiKey {
                api_key: parts.api_key,
                header_name: parts
                    .api_key_header
                    .filter(|h| !h.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
            },
            AuthType::Basic => AuthConfig::Basic {
                username: parts.username,
                password: parts.password,
            },
            AuthType::OAuth2 => {
                let config = parts.oauth2.ok_or_else(|| {
                    QueryBridgeError::Configuration(
                        "OAuth2 config is required for OAuth2 authentication".to_string(),
                    )
                })?;
                AuthConfig::OAuth2(Arc::new(config))
            }
        };
        Ok(auth)
    }

    pub fn auth_type(&self) -> AuthType {
        match self {
            AuthConfig::None => AuthType::None,
            AuthConfig::Bearer { .. } => AuthType::Bearer,
            AuthConfig::ApiKey { .. } => AuthType::ApiKey,
            AuthConfig::Basic { .. } => AuthType::Basic,
            AuthConfig::OAuth2(_) => AuthType::OAuth2,
        }
    }

    pub fn requires_oauth2(&self) -> bool {
        matches!(self, AuthConfig::OAuth2(_))
    }
}

/// Flat auth inputs as they arrive from the CLI or an HTTP payload
#[derive(Debug, Clone, Default)]
pub struct AuthParts {
    pub token: Option<String>,
    pub api_key: Option<String>,
    pub api_key_header: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub oauth2: Option<OAuth2Config>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_defaults_api_key_header() {
        let auth = AuthConfig::from_parts(
            AuthType::ApiKey,
            AuthParts {
                api_key: Some("k".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(auth, AuthConfig::api_key("k"));
    }

    #[test]
    fn test_from_parts_oauth2_requires_config() {
        let err = AuthConfig::from_parts(AuthType::OAuth2, AuthParts::default()).unwrap_err();
        assert!(matches!(err, QueryBridgeError::Configuration(_)));
    }

    #[test]
    fn test_auth_type_round_trip() {
        for name in ["none", "bearer", "api_key", "basic", "oauth2"] {
            let auth_type: AuthType = name.parse().unwrap();
            assert_eq!(auth_type.as_str(), name);
        }
        assert_eq!("api-key".parse::<AuthType>().unwrap(), AuthType::ApiKey);
        assert!("kerberos".parse::<AuthType>().is_err());
    }

    #[test]
    fn test_auth_type_of_variant() {
        let config = OAuth2Config::client_credentials("https://auth/token", "id", "secret").unwrap();
        assert_eq!(AuthConfig::oauth2(config).auth_type(), AuthType::OAuth2);
        assert_eq!(AuthConfig::basic("u", "p").auth_type(), AuthType::Basic);
        assert!(!AuthConfig::None.requires_oauth2());
    }
}
