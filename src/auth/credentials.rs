// OAuth2 credential and token value objects

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::oauth2::OAuth2Error;
use crate::{QueryBridgeError, Result};

/// Seconds subtracted from a token's lifetime before it is treated as expired
pub const EXPIRY_MARGIN_SECS: i64 = 30;

/// Form fields the token request builds itself; extra params may not set them
pub const RESERVED_TOKEN_PARAMS: &[&str] = &[
    "grant_type",
    "client_id",
    "client_secret",
    "username",
    "password",
    "scope",
    "audience",
    "refresh_token",
    "code",
];

/// OAuth2 grant types understood by the token manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OAuth2GrantType {
    #[default]
    ClientCredentials,
    Password,
    AuthorizationCode,
    RefreshToken,
}

impl OAuth2GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuth2GrantType::ClientCredentials => "client_credentials",
            OAuth2GrantType::Password => "password",
            OAuth2GrantType::AuthorizationCode => "authorization_code",
            OAuth2GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for OAuth2GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuth2GrantType {
    type Err = QueryBridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "client_credentials" => Ok(OAuth2GrantType::ClientCredentials),
            "password" => Ok(OAuth2GrantType::Password),
            "authorization_code" => Ok(OAuth2GrantType::AuthorizationCode),
            "refresh_token" => Ok(OAuth2GrantType::RefreshToken),
            other => Err(QueryBridgeError::Configuration(format!(
                "Unsupported OAuth2 grant type: {}",
                other
            ))),
        }
    }
}

/// Validated OAuth2 client configuration.
///
/// Built through [`OAuth2ConfigBuilder`]; once built it cannot be changed, so every
/// config reaching the token manager has already passed the grant-type checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuth2Config {
    token_url: String,
    grant_type: OAuth2GrantType,
    client_id: Option<String>,
    client_secret: Option<String>,
    username: Option<String>,
    password: Option<String>,
    scopes: Vec<String>,
    audience: Option<String>,
    extra_params: BTreeMap<String, String>,
}

impl OAuth2Config {
    pub fn builder(token_url: impl Into<String>) -> OAuth2ConfigBuilder {
        OAuth2ConfigBuilder::new(token_url)
    }

    /// Shortcut for the most common machine-to-machine setup
    pub fn client_credentials(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self> {
        Self::builder(token_url)
            .client_id(client_id)
            .client_secret(client_secret)
            .build()
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn grant_type(&self) -> OAuth2GrantType {
        self.grant_type
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    pub fn extra_params(&self) -> &BTreeMap<String, String> {
        &self.extra_params
    }

    /// Form fields for a credential exchange, in the order they are sent
    pub fn token_request_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("grant_type".to_string(), self.grant_type.to_string())];

        let optional = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("username", &self.username),
            ("password", &self.password),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                params.push((name.to_string(), value.clone()));
            }
        }

        if !self.scopes.is_empty() {
            params.push(("scope".to_string(), self.scopes.join(" ")));
        }
        if let Some(audience) = &self.audience {
            params.push(("audience".to_string(), audience.clone()));
        }
        for (key, value) in &self.extra_params {
            params.push((key.clone(), value.clone()));
        }

        params
    }

    /// Form fields for a refresh-token exchange
    pub fn refresh_request_params(&self, refresh_token: &str) -> Vec<(String, String)> {
        let mut params = vec![
            ("grant_type".to_string(), OAuth2GrantType::RefreshToken.to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
        ];
        if let Some(client_id) = &self.client_id {
            params.push(("client_id".to_string(), client_id.clone()));
        }
        if let Some(client_secret) = &self.client_secret {
            params.push(("client_secret".to_string(), client_secret.clone()));
        }
        params
    }
}

/// Builder for [`OAuth2Config`]; validation happens in [`build`](Self::build)
#[derive(Debug, Clone, Default)]
pub struct OAuth2ConfigBuilder {
    token_url: String,
    grant_type: OAuth2GrantType,
    client_id: Option<String>,
    client_secret: Option<String>,
    username: Option<String>,
    password: Option<String>,
    scopes: Vec<String>,
    audience: Option<String>,
    extra_params: BTreeMap<String, String>,
}

impl OAuth2ConfigBuilder {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            ..Default::default()
        }
    }

    pub fn grant_type(mut self, grant_type: OAuth2GrantType) -> Self {
        self.grant_type = grant_type;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn extra_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<OAuth2Config> {
        let config_error = |msg: &str| Err(QueryBridgeError::Configuration(msg.to_string()));

        if self.token_url.trim().is_empty() {
            return config_error("token_url is required");
        }

        let present = |value: &Option<String>| value.as_deref().map_or(false, |v| !v.is_empty());

        match self.grant_type {
            OAuth2GrantType::ClientCredentials
                if !present(&self.client_id) || !present(&self.client_secret) =>
            {
                return config_error("client_id and client_secret are required for client_credentials grant");
            }
            OAuth2GrantType::Password if !present(&self.username) || !present(&self.password) => {
                return config_error("username and password are required for password grant");
            }
            _ => {}
        }

        if let Some(key) = self
            .extra_params
            .keys()
            .find(|key| RESERVED_TOKEN_PARAMS.contains(&key.as_str()))
        {
            return Err(QueryBridgeError::Configuration(format!(
                "extra parameter '{}' would override a reserved token request field",
                key
            )));
        }

        Ok(OAuth2Config {
            token_url: self.token_url,
            grant_type: self.grant_type,
            client_id: self.client_id,
            client_secret: self.client_secret,
            username: self.username,
            password: self.password,
            scopes: self.scopes,
            audience: self.audience,
            extra_params: self.extra_params,
        })
    }
}

/// Access token as returned by a token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Token {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub obtained_at: DateTime<Utc>,
}

impl OAuth2Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_in: None,
            refresh_token: None,
            scope: None,
            obtained_at: Utc::now(),
        }
    }

    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_obtained_at(mut self, obtained_at: DateTime<Utc>) -> Self {
        self.obtained_at = obtained_at;
        self
    }

    /// `obtained_at + secs - margin`, or `None` when that falls outside the representable range
    fn deadline(&self, secs: u64, margin: i64) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(secs).ok()?.checked_sub(margin)?;
        self.obtained_at.checked_add_signed(Duration::try_seconds(secs)?)
    }

    /// Absolute expiry, if the endpoint reported a representable lifetime
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in.and_then(|secs| self.deadline(secs, 0))
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// A token without a known (or representable) lifetime never expires
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_in
            .and_then(|secs| self.deadline(secs, EXPIRY_MARGIN_SECS))
            .map_or(false, |deadline| now >= deadline)
    }

    /// `("Authorization", "<token_type> <access_token>")`
    pub fn as_header(&self) -> (String, String) {
        (
            "Authorization".to_string(),
            format!("{} {}", self.token_type, self.access_token),
        )
    }

    /// Build a token from a token endpoint's JSON body
    pub fn from_response(body: &Value) -> std::result::Result<Self, OAuth2Error> {
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                OAuth2Error::new(
                    "No access_token in response",
                    body.get("error").and_then(Value::as_str).map(str::to_string),
                )
            })?;

        let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);

        let expires_in = match body.get("expires_in") {
            Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        };

        Ok(Self {
            access_token: access_token.to_string(),
            token_type: text("token_type").unwrap_or_else(|| "Bearer".to_string()),
            expires_in,
            refresh_token: text("refresh_token"),
            scope: text("scope"),
            obtained_at: Utc::now(),
        })
    }
}
