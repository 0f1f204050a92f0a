//! HTTP client for structured-output LLM calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::config::{LlmConfig, LlmProvider};
use super::schema::OutputSchema;
use super::{LlmError, StructuredLlm};

/// LLM client speaking either the Ollama or the OpenAI chat completions API.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a Value,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

const SYSTEM_PROMPT: &str = "You are an expert web scraping assistant. \
Respond only with JSON that matches the provided schema.";

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the LLM service is reachable.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = match self.config.provider {
            LlmProvider::Ollama => format!("{}/api/tags", self.endpoint()),
            LlmProvider::OpenAI => format!("{}/models", self.endpoint()),
        };
        let mut req = self.client.get(&url);
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    async fn call_ollama(&self, prompt: &str, schema: &OutputSchema) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: &self.config.model,
            system: SYSTEM_PROMPT,
            prompt,
            stream: false,
            format: &schema.schema,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.endpoint());
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(ollama_resp.response)
    }

    async fn call_openai(&self, prompt: &str, schema: &OutputSchema) -> Result<String, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::Api("API key required for OpenAI-compatible provider".into()))?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &schema.name,
                    schema: &schema.schema,
                    strict: true,
                },
            },
        };

        let url = format!("{}/chat/completions", self.endpoint());
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("Empty completion".to_string()))
    }
}

/// Parse model text as JSON, tolerating markdown code fences around it.
pub fn parse_json_response(text: &str) -> Result<Value, LlmError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    if unfenced.is_empty() {
        return Err(LlmError::Parse("Empty response".to_string()));
    }

    serde_json::from_str(unfenced).map_err(|e| LlmError::Parse(e.to_string()))
}

#[async_trait]
impl StructuredLlm for LlmClient {
    async fn generate(&self, prompt: &str, schema: &OutputSchema) -> Result<Value, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        debug!(
            "Requesting {} from {} ({} prompt bytes)",
            schema.name,
            self.config.model,
            prompt.len()
        );

        let text = match self.config.provider {
            LlmProvider::Ollama => self.call_ollama(prompt, schema).await?,
            LlmProvider::OpenAI => self.call_openai(prompt, schema).await?,
        };

        parse_json_response(&text)
    }
}
