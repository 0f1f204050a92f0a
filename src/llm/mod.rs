//! LLM collaborator: prompt plus declared schema in, JSON value out.
//!
//! Supports Ollama for local inference and any OpenAI-compatible chat
//! completions API (OpenAI, Groq, Gemini's compatibility endpoint, ...).

mod client;
mod config;
mod schema;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use client::{parse_json_response, LlmClient};
pub use config::{LlmConfig, LlmProvider};
pub use schema::OutputSchema;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid structured output: {0}")]
    Validation(#[from] crate::analysis::ValidationError),

    #[error("LLM is disabled")]
    Disabled,
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::Disabled)
    }
}

/// Anything that can turn a prompt and schema into a JSON value.
#[async_trait]
pub trait StructuredLlm: Send + Sync {
    async fn generate(&self, prompt: &str, schema: &OutputSchema) -> Result<Value, LlmError>;
}
