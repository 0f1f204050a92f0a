//! Headless browser collaborator.
//!
//! The scrape controller drives pages through the [`BrowserLauncher`] and
//! [`BrowserSession`] traits. The production implementation uses
//! chromiumoxide (CDP) with request interception and stealth patches; tests
//! substitute scripted sessions.

mod config;
mod types;

#[cfg(feature = "browser")]
mod chrome;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use config::BrowserEngineConfig;
pub use types::{
    DomDescriptor, InterceptedRequest, InterceptionLog, InterceptionPolicy, RequestVerdict,
    ResourceKind, DOM_DESCRIPTOR_SCRIPT,
};

#[cfg(feature = "browser")]
pub use chrome::ChromeLauncher;

/// Errors raised by browser sessions.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("Browser support not compiled. Rebuild with: cargo build --features browser")]
    Unsupported,
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// One page in one browser, owned by a single scrape invocation.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Start pausing requests under `policy`. Must be called before navigation.
    async fn enable_interception(&self, policy: InterceptionPolicy) -> Result<(), BrowserError>;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn title(&self) -> Result<String, BrowserError>;

    async fn url(&self) -> Result<String, BrowserError>;

    /// Returns whether the selector matched before the timeout.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
        -> Result<bool, BrowserError>;

    /// Returns whether the network went quiet for `quiet` before the timeout.
    async fn wait_for_network_idle(
        &self,
        quiet: Duration,
        timeout: Duration,
    ) -> Result<bool, BrowserError>;

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    async fn content(&self) -> Result<String, BrowserError>;

    /// Click the first element matching `selector`. Returns false when none matched.
    async fn click(&self, selector: &str) -> Result<bool, BrowserError>;

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), BrowserError>;

    /// Intermediate-host requests seen so far, in order.
    fn intercepted(&self) -> Vec<InterceptedRequest>;

    /// Auxiliary media-looking URLs seen so far.
    fn candidates(&self) -> Vec<String>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// Launcher used when the crate is built without the `browser` feature.
#[cfg(not(feature = "browser"))]
pub struct ChromeLauncher {
    #[allow(dead_code)]
    config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl ChromeLauncher {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        Err(BrowserError::Unsupported)
    }
}
