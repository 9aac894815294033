//! OpenAI chat completions client
//! The default [`LanguageModel`] backend

use async_trait::async_trait;
use reqwest::{header::HeaderMap, header::HeaderValue, header::CONTENT_TYPE, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::{ChatMessage, LLMError, LLMResult, LanguageModel};

/// OpenAI-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// API key for authentication
    pub api_key: String,
    /// Base URL for API requests
    pub base_url: String,
    /// Organization ID (optional)
    pub organization: Option<String>,
    /// Model used for every completion
    pub model: String,
    /// Sampling temperature; planning wants deterministic output
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            organization: None,
            model: "gpt-4".to_string(),
            temperature: 0.0,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

/// OpenAI provider client
pub struct OpenAIClient {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIClient {
    /// Create a new OpenAI client with configuration
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Create a new OpenAI client with default configuration
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self::new(OpenAIConfig {
            api_key: api_key.into(),
            ..Default::default()
        })
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build HTTP headers for requests
    fn build_headers(&self) -> LLMResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
                .map_err(|e| LLMError::Internal(format!("Invalid API key format: {}", e)))?,
        );

        if let Some(org) = &self.config.organization {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org)
                    .map_err(|e| LLMError::Internal(format!("Invalid organization format: {}", e)))?,
            );
        }

        Ok(headers)
    }

    /// Handle error responses from OpenAI
    fn handle_error_response(&self, status_code: u16, error_text: &str) -> LLMError {
        let message = serde_json::from_str::<OpenAIError>(error_text)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| error_text.to_string());

        match status_code {
            401 => LLMError::AuthenticationFailed(message),
            429 => LLMError::RateLimitExceeded(message),
            400 => LLMError::InvalidRequest(message),
            408 | 504 => LLMError::Timeout(message),
            _ => LLMError::Internal(format!("OpenAI API error ({}): {}", status_code, message)),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    async fn complete(&self, messages: &[ChatMessage]) -> LLMResult<String> {
        let headers = self.build_headers()?;
        let request = OpenAIRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
        };
        let request_url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        debug!(url = %request_url, model = %self.config.model, "OpenAI API request");

        let response = self
            .client
            .post(&request_url)
            .headers(headers)
            .json(&request)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout(e.to_string())
                } else {
                    LLMError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            error!("OpenAI API Error: {} - {}", status, error_text);
            return Err(self.handle_error_response(status.as_u16(), &error_text));
        }

        let body: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| LLMError::Serialization(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| LLMError::MalformedOutput("response contained no choices".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
