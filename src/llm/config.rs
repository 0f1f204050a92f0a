//! LLM client configuration.

use serde::{Deserialize, Serialize};

/// LLM provider type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Ollama API (local, default)
    #[default]
    Ollama,
    /// OpenAI-compatible chat completions API (OpenAI, Groq, Gemini, Together.ai, ...)
    OpenAI,
}

impl LlmProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "groq" | "together" | "gemini" | "google" => Some(Self::OpenAI),
            _ => None,
        }
    }
}

/// Hosted endpoints for the OpenAI-compatible aliases, including the API version path.
fn hosted_endpoint(name: &str) -> Option<&'static str> {
    match name {
        "openai" => Some("https://api.openai.com/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        "gemini" | "google" => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
        _ => None,
    }
}

fn provider_key_var(name: &str) -> Option<&'static str> {
    match name {
        "openai" => Some("OPENAI_API_KEY"),
        "groq" => Some("GROQ_API_KEY"),
        "gemini" | "google" => Some("GOOGLE_API_KEY"),
        _ => None,
    }
}

/// Configuration for the structured-output LLM client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Whether AI analysis is attempted at all. When false the analyzer
    /// goes straight to the heuristic path.
    pub enabled: bool,
    pub provider: LlmProvider,
    /// API base URL. For OpenAI-compatible providers this includes the version
    /// path, e.g. `https://api.openai.com/v1`.
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Custom page analysis prompt (uses the {content} placeholder)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: LlmProvider::default(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            model: "llama3.1:8b".to_string(),
            max_tokens: 4096,
            temperature: 0.1,
            timeout_secs: 120,
            analysis_prompt: None,
        }
    }
}

impl LlmConfig {
    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LLM_ENABLED`: "true" or "false"
    /// - `LLM_PROVIDER`: "ollama" (default), "openai", "groq", "gemini" or "together"
    /// - `LLM_ENDPOINT`: API endpoint (defaults based on provider)
    /// - `LLM_API_KEY`: API key for OpenAI-compatible providers
    /// - `LLM_MODEL`, `LLM_MAX_TOKENS`, `LLM_TEMPERATURE`, `LLM_TIMEOUT_SECS`
    /// - `LLM_ANALYSIS_PROMPT`: custom analysis prompt
    ///
    /// Without `LLM_PROVIDER`, the provider is auto-detected from
    /// `GROQ_API_KEY`, `OPENAI_API_KEY` or `GOOGLE_API_KEY` (in that order).
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an injectable lookup.
    pub fn with_overrides_from<F>(mut self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = var("LLM_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        let explicit_provider = var("LLM_PROVIDER").map(|p| p.to_lowercase());
        if let Some(provider) = explicit_provider.as_deref().and_then(LlmProvider::parse) {
            self.provider = provider;
        }

        let explicit_endpoint = var("LLM_ENDPOINT");
        if let Some(ref endpoint) = explicit_endpoint {
            self.endpoint = endpoint.clone();
        }

        if let Some(key) = var("LLM_API_KEY") {
            self.api_key = Some(key);
        }

        if let Some(ref name) = explicit_provider {
            if explicit_endpoint.is_none() {
                if let Some(endpoint) = hosted_endpoint(name) {
                    self.endpoint = endpoint.to_string();
                }
            }
            if self.api_key.is_none() {
                self.api_key = provider_key_var(name).and_then(&var);
            }
        } else if self.api_key.is_none() {
            for name in ["groq", "openai", "gemini"] {
                let Some(key) = provider_key_var(name).and_then(&var) else {
                    continue;
                };
                self.api_key = Some(key);
                self.provider = LlmProvider::OpenAI;
                if explicit_endpoint.is_none() {
                    if let Some(endpoint) = hosted_endpoint(name) {
                        self.endpoint = endpoint.to_string();
                    }
                }
                break;
            }
        }

        if let Some(val) = var("LLM_MODEL") {
            self.model = val;
        }
        if let Some(n) = var("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.max_tokens = n;
        }
        if let Some(t) = var("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.temperature = t;
        }
        if let Some(n) = var("LLM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = n;
        }
        if let Some(val) = var("LLM_ANALYSIS_PROMPT") {
            self.analysis_prompt = Some(val);
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}
