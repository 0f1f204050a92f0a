//! Browser engine configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Browser engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    /// Set to false for debugging or if headless detection is an issue.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Apply stealth patches to new documents (default: true).
    #[serde(default = "default_stealth")]
    pub stealth: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// CDP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    /// Chrome executable. Searched for in common locations when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// User agent override for every page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

pub fn default_headless() -> bool {
    true
}

pub fn default_stealth() -> bool {
    true
}

pub fn default_timeout() -> u64 {
    30
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            stealth: default_stealth(),
            proxy: None,
            timeout: default_timeout(),
            chrome_args: Vec::new(),
            remote_url: None,
            executable: None,
            user_agent: None,
        }
    }
}

impl BrowserEngineConfig {
    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `BROWSER_URL`: remote DevTools URL
    /// - `CHROME_EXECUTABLE` or `PUPPETEER_EXECUTABLE_PATH`: browser binary
    /// - `BROWSER_HEADLESS`: "false" to show the window
    /// - `BROWSER_PROXY`: proxy server URL
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    pub fn with_overrides_from<F>(mut self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("BROWSER_URL").filter(|v| !v.is_empty()) {
            self.remote_url = Some(url);
        }
        if let Some(path) = var("CHROME_EXECUTABLE")
            .or_else(|| var("PUPPETEER_EXECUTABLE_PATH"))
            .filter(|v| !v.is_empty())
        {
            self.executable = Some(PathBuf::from(path));
        }
        if let Some(val) = var("BROWSER_HEADLESS") {
            self.headless = !(val.eq_ignore_ascii_case("false") || val == "0");
        }
        if let Some(proxy) = var("BROWSER_PROXY").filter(|v| !v.is_empty()) {
            self.proxy = Some(proxy);
        }
        self
    }
}
