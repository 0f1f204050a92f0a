//! Scrape policy knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalyzerConfig;
use crate::browser::InterceptionPolicy;
use crate::resolve::ResolverConfig;
use crate::retry::RetryPolicy;

/// Retry counts, timeouts and selectors for one scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub navigation_attempts: u32,
    pub navigation_timeout_secs: u64,
    /// Linear backoff unit between navigation attempts.
    pub navigation_retry_delay_ms: u64,
    /// Quiet period that counts as "network idle".
    pub network_quiet_ms: u64,
    /// Upper bound on the post-navigation idle wait.
    pub navigation_idle_timeout_ms: u64,
    /// Upper bound on the idle wait before content extraction.
    pub content_idle_timeout_ms: u64,
    /// Upper bound on waiting for a player element.
    pub player_selector_timeout_ms: u64,
    /// Fixed wait before the HTML snapshot.
    pub settle_ms: u64,
    /// Time given to a challenge page to resolve itself.
    pub interstitial_wait_ms: u64,
    /// Clicked once on redirect-confirmation pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interstitial_confirm_selector: Option<String>,
    pub interstitial_navigation_timeout_ms: u64,
    pub player_selectors: Vec<String>,
    /// Host fragments marking intermediate hosts.
    pub intermediate_hosts: Vec<String>,
    pub analyzer: AnalyzerConfig,
    pub resolver: ResolverConfig,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            navigation_attempts: 3,
            navigation_timeout_secs: 60,
            navigation_retry_delay_ms: 2_000,
            network_quiet_ms: 500,
            navigation_idle_timeout_ms: 10_000,
            content_idle_timeout_ms: 10_000,
            player_selector_timeout_ms: 5_000,
            settle_ms: 2_000,
            interstitial_wait_ms: 5_000,
            interstitial_confirm_selector: Some(
                "a.redirect, #continue, .continue, button[type=submit]".to_string(),
            ),
            interstitial_navigation_timeout_ms: 15_000,
            player_selectors: vec![
                "video".to_string(),
                "iframe".to_string(),
                ".player".to_string(),
                "#player".to_string(),
            ],
            intermediate_hosts: vec!["kwik.cx".to_string(), "kwik.sx".to_string()],
            analyzer: AnalyzerConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl ScrapeConfig {
    pub fn navigation_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.navigation_attempts,
            Duration::from_millis(self.navigation_retry_delay_ms),
        )
    }

    pub fn interception_policy(&self) -> InterceptionPolicy {
        InterceptionPolicy::default().with_intermediate_hosts(self.intermediate_hosts.clone())
    }

    /// All player selectors as one CSS selector list.
    pub fn player_selector(&self) -> String {
        self.player_selectors.join(", ")
    }

    /// Shrink every wait to zero. Handy for tests and offline runs.
    pub fn without_waits(mut self) -> Self {
        self.navigation_retry_delay_ms = 0;
        self.network_quiet_ms = 0;
        self.settle_ms = 0;
        self.interstitial_wait_ms = 0;
        self.analyzer.retry_delay_ms = 0;
        self.resolver.retry_delay_ms = 0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ScrapeConfig = toml::from_str(
            r#"
            navigation_attempts = 5
            intermediate_hosts = ["kwik.si"]

            [resolver]
            batch_size = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.navigation_attempts, 5);
        assert_eq!(config.settle_ms, 2_000);
        assert_eq!(config.resolver.batch_size, 2);
        assert_eq!(config.resolver.max_attempts, 3);
        assert!(config.interception_policy().is_intermediate("https://kwik.si/e/1"));
        assert!(!config.interception_policy().is_intermediate("https://kwik.cx/e/1"));
    }

    #[test]
    fn test_player_selector_joins() {
        let config = ScrapeConfig::default();
        assert_eq!(config.player_selector(), "video, iframe, .player, #player");
        assert_eq!(config.navigation_policy().max_attempts, 3);
    }
}
