//! Configuration management.
//!
//! Settings come from an optional TOML (or JSON) file, then environment
//! variables. Each section applies its own overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::browser::BrowserEngineConfig;
use crate::llm::LlmConfig;
use crate::scrape::ScrapeConfig;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "streamprobe.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

/// Full application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmConfig,
    pub browser: BrowserEngineConfig,
    pub scrape: ScrapeConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `path`, or from [`DEFAULT_CONFIG_FILE`] if it
    /// exists, then apply environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::load_from_path(path).await?
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load_from_path(default).await?
                } else {
                    debug!("No config file, using defaults");
                    Self::default()
                }
            }
        };
        Ok(settings.with_env_overrides())
    }

    /// Parse a config file. Format follows the extension; anything but
    /// `.json` is read as TOML.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
        let mut settings = Self::parse(&contents, ext).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        settings.source_path = Some(path.to_path_buf());
        debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "json" => serde_json::from_str(contents).map_err(|e| e.to_string()),
            _ => toml::from_str(contents).map_err(|e| e.to_string()),
        }
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    pub fn with_overrides_from<F>(mut self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        self.llm = self.llm.with_overrides_from(&var);
        self.browser = self.browser.with_overrides_from(&var);

        if let Some(hosts) = var("INTERMEDIATE_HOSTS") {
            let hosts: Vec<String> = hosts
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
            if !hosts.is_empty() {
                self.scrape.intermediate_hosts = hosts;
            }
        }

        if self.scrape.resolver.user_agent.is_none() {
            self.scrape.resolver.user_agent = self.browser.user_agent.clone();
        }
        if self.scrape.analyzer.prompt.is_none() {
            self.scrape.analyzer.prompt = self.llm.analysis_prompt.clone();
        }
        self
    }

    /// Settings as TOML with secrets masked.
    pub fn to_toml_redacted(&self) -> Result<String, ConfigError> {
        let mut redacted = self.clone();
        if redacted.llm.api_key.is_some() {
            redacted.llm.api_key = Some("********".to_string());
        }
        toml::to_string_pretty(&redacted).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}
