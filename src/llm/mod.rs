//! Language model access
//!
//! Pipelines only see the [`LanguageModel`] trait. The default backend is the OpenAI chat
//! completions client in [`openai`]; prompts live in [`prompts`].

pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chat message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Error types for LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
}

/// Result type for LLM operations
pub type LLMResult<T> = Result<T, LLMError>;

/// Text completion service used for planning, selection and analysis
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the conversation and return the assistant's reply text
    async fn complete(&self, messages: &[ChatMessage]) -> LLMResult<String>;

    /// Model identifier for logs
    fn model_name(&self) -> &str;
}

/// Parse a model reply that is supposed to be JSON.
///
/// Models often wrap JSON in markdown fences or add a sentence around it, so the
/// outermost `{...}` / `[...]` span is tried when the whole reply does not parse.
pub fn parse_json_reply(reply: &str) -> LLMResult<Value> {
    let trimmed = strip_code_fence(reply.trim());

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let span = |open: char, close: char| {
        let start = trimmed.find(open)?;
        let end = trimmed.rfind(close)?;
        (end > start).then(|| &trimmed[start..=end])
    };

    for candidate in [span('{', '}'), span('[', ']')].into_iter().flatten() {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Ok(value);
        }
    }

    let preview: String = reply.chars().take(120).collect();
    Err(LLMError::MalformedOutput(format!(
        "expected JSON, got: {}",
        preview
    )))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
