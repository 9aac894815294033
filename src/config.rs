// Runtime configuration
// Environment variables (optionally from a .env file) with defaults for everything but the LLM key

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::{QueryBridgeError, Result};

/// Process-wide settings shared by the server and the CLI
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub llm_temperature: f32,
    pub database_url: Option<String>,
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    pub http_timeout_secs: u64,
    pub spec_probe_timeout_secs: u64,
    pub oauth2_timeout_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub log_level: String,
}

impl Settings {
    /// Load `.env` if present, then read the process environment
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_environment(None)
    }

    /// Read settings from `vars` instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_environment(Some(vars))
    }

    fn from_environment(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .set_default("openai_api_key", "")
            .and_then(|b| b.set_default("openai_model", "gpt-4"))
            .and_then(|b| b.set_default("openai_base_url", "https://api.openai.com/v1"))
            .and_then(|b| b.set_default("llm_temperature", 0.0))
            .and_then(|b| b.set_default("http_timeout_secs", 30))
            .and_then(|b| b.set_default("spec_probe_timeout_secs", 10))
            .and_then(|b| b.set_default("oauth2_timeout_secs", 30))
            .and_then(|b| b.set_default("server_host", "0.0.0.0"))
            .and_then(|b| b.set_default("server_port", 8000))
            .and_then(|b| b.set_default("log_level", "info"))
            .map_err(config_error)?
            .add_source(config::Environment::default().try_parsing(true).source(vars))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.openai_api_key.trim().is_empty() {
            return Err(QueryBridgeError::Configuration(
                "OPENAI_API_KEY is required".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 || self.oauth2_timeout_secs == 0 {
            return Err(QueryBridgeError::Configuration(
                "timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn spec_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.spec_probe_timeout_secs)
    }

    pub fn oauth2_timeout(&self) -> Duration {
        Duration::from_secs(self.oauth2_timeout_secs)
    }

    /// `host:port` for the HTTP server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn config_error(e: config::ConfigError) -> QueryBridgeError {
    QueryBridgeError::Configuration(e.to_string())
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `default_level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
