//! Resolution of intermediate-host URLs into final media URLs.
//!
//! Each unique intercepted URL is fetched with its captured referrer and the
//! body is scanned for media URLs. Fetches run in fixed-size batches:
//! concurrent within a batch, sequential across batches.

mod http;
mod user_agent;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::InterceptedRequest;
use crate::extract::{extract_m3u8_source, extract_video_urls, VideoUrls};
use crate::progress::{NoopSink, ProgressEvent, ProgressSink};
use crate::retry::RetryPolicy;

pub use http::HttpFetcher;
pub use user_agent::{random_user_agent, resolve_user_agent, BROWSER_USER_AGENTS};

const COMPONENT: &str = "resolver";

/// Errors from a single intermediate fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,
}

/// One GET against an intermediate host.
#[async_trait]
pub trait IntermediateFetcher: Send + Sync {
    /// Fetch `url` with the given `Referer`, returning the body on a 2xx status.
    async fn fetch(&self, url: &str, referrer: &str) -> Result<String, ResolveError>;
}

/// Resolver tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// URLs fetched concurrently per batch.
    pub batch_size: usize,
    pub max_attempts: u32,
    /// Linear backoff unit between attempts.
    pub retry_delay_ms: u64,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// User-agent string, or "impersonate" / unset for a random browser UA.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            max_attempts: 3,
            retry_delay_ms: 1_000,
            timeout_secs: 15,
            user_agent: None,
        }
    }
}

/// Outcome of resolving one intermediate URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KwikResolution {
    pub original_url: String,
    #[serde(rename = "videoURLs")]
    pub video_urls: VideoUrls,
    /// First m3u8 URL in the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub m3u8: Option<String>,
    pub success: bool,
    pub attempts_used: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// URL plus the referrer to send when fetching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveTarget {
    pub url: String,
    pub referrer: String,
}

/// Deduplicate by URL keeping first-occurrence order and referrer.
///
/// Requests without a captured referrer use `fallback_referrer`.
pub fn unique_targets(
    requests: &[InterceptedRequest],
    fallback_referrer: &str,
) -> Vec<ResolveTarget> {
    let mut seen = HashSet::new();
    requests
        .iter()
        .filter(|r| seen.insert(r.url.as_str()))
        .map(|r| ResolveTarget {
            url: r.url.clone(),
            referrer: r
                .referrer
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| fallback_referrer.to_string()),
        })
        .collect()
}

pub struct Resolver {
    fetcher: Arc<dyn IntermediateFetcher>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(fetcher: Arc<dyn IntermediateFetcher>, config: ResolverConfig) -> Self {
        Self { fetcher, config }
    }

    /// Resolver backed by [`HttpFetcher`].
    pub fn http(config: ResolverConfig) -> Result<Self, ResolveError> {
        let fetcher = HttpFetcher::new(
            Duration::from_secs(config.timeout_secs),
            config.user_agent.as_deref(),
        )?;
        Ok(Self::new(Arc::new(fetcher), config))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.config.max_attempts,
            Duration::from_millis(self.config.retry_delay_ms),
        )
    }

    /// Fetch one URL with retries and scan the body.
    pub async fn resolve_one(&self, target: &ResolveTarget) -> KwikResolution {
        let outcome = self
            .retry_policy()
            .run(|attempt| {
                debug!("Resolving {} (attempt {})", target.url, attempt);
                self.fetcher.fetch(&target.url, &target.referrer)
            })
            .await;

        match outcome {
            Ok((body, attempts)) => {
                let video_urls = extract_video_urls(&body);
                info!(
                    "Resolved {}: {} media URL(s)",
                    target.url,
                    video_urls.total()
                );
                KwikResolution {
                    original_url: target.url.clone(),
                    m3u8: extract_m3u8_source(&body),
                    video_urls,
                    success: true,
                    attempts_used: attempts,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Giving up on {}: {}", target.url, e);
                KwikResolution {
                    original_url: target.url.clone(),
                    video_urls: VideoUrls::default(),
                    m3u8: None,
                    success: false,
                    attempts_used: e.attempts,
                    error: Some(e.last_error.to_string()),
                }
            }
        }
    }

    pub async fn resolve_all(
        &self,
        requests: &[InterceptedRequest],
        fallback_referrer: &str,
    ) -> Vec<KwikResolution> {
        self.resolve_all_with(requests, fallback_referrer, &NoopSink)
            .await
    }

    /// Resolve every unique intercepted URL, one batch at a time.
    pub async fn resolve_all_with(
        &self,
        requests: &[InterceptedRequest],
        fallback_referrer: &str,
        sink: &dyn ProgressSink,
    ) -> Vec<KwikResolution> {
        let targets = unique_targets(requests, fallback_referrer);
        if targets.is_empty() {
            return Vec::new();
        }

        sink.emit(ProgressEvent::info(
            COMPONENT,
            format!("Resolving {} intermediate URL(s)", targets.len()),
        ));

        let mut results = Vec::with_capacity(targets.len());
        for batch in targets.chunks(self.config.batch_size.max(1)) {
            let resolved = join_all(batch.iter().map(|t| self.resolve_one(t))).await;
            for r in &resolved {
                if !r.success {
                    sink.emit(ProgressEvent::warn(
                        COMPONENT,
                        format!(
                            "Failed to resolve {}: {}",
                            r.original_url,
                            r.error.as_deref().unwrap_or("unknown error")
                        ),
                    ));
                }
            }
            results.extend(resolved);
        }

        let resolved = results.iter().filter(|r| r.success).count();
        sink.emit(ProgressEvent::info(
            COMPONENT,
            format!("Resolved {}/{} intermediate URL(s)", resolved, results.len()),
        ));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ResourceKind;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn request(url: &str, referrer: Option<&str>) -> InterceptedRequest {
        InterceptedRequest {
            url: url.to_string(),
            resource_type: ResourceKind::Document,
            referrer: referrer.map(str::to_string),
            observed_at: Utc::now(),
        }
    }

    fn fast() -> ResolverConfig {
        ResolverConfig {
            retry_delay_ms: 0,
            ..Default::default()
        }
    }

    /// Serves a body per URL, tracking calls and concurrency.
    #[derive(Default)]
    struct StubFetcher {
        calls: Mutex<Vec<(String, String)>>,
        failing: Vec<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl IntermediateFetcher for StubFetcher {
        async fn fetch(&self, url: &str, referrer: &str) -> Result<String, ResolveError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), referrer.to_string()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.iter().any(|f| f == url) {
                return Err(ResolveError::Status(503));
            }
            Ok(format!(
                r#"<script>source='https://cdn.test/{}/master.m3u8'</script>"#,
                url.rsplit('/').next().unwrap_or("x")
            ))
        }
    }

    #[test]
    fn test_unique_targets_keeps_first_referrer() {
        let requests = vec![
            request("https://kwik.cx/e/a", Some("https://site.test/1")),
            request("https://kwik.cx/e/a", Some("https://other.test")),
            request("https://kwik.cx/e/b", None),
        ];
        let targets = unique_targets(&requests, "https://page.test");
        assert_eq!(
            targets,
            vec![
                ResolveTarget {
                    url: "https://kwik.cx/e/a".into(),
                    referrer: "https://site.test/1".into()
                },
                ResolveTarget {
                    url: "https://kwik.cx/e/b".into(),
                    referrer: "https://page.test".into()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_fetched_once() {
        let fetcher = Arc::new(StubFetcher::default());
        let resolver = Resolver::new(fetcher.clone(), fast());
        let requests = vec![
            request("https://kwik.cx/e/a", None),
            request("https://kwik.cx/e/a", None),
            request("https://kwik.cx/e/b", None),
        ];

        let results = resolver.resolve_all(&requests, "https://page.test").await;
        assert_eq!(fetcher.calls.lock().unwrap().len(), 2);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success && r.attempts_used == 1));
        assert_eq!(
            results[0].video_urls.m3u8,
            vec!["https://cdn.test/a/master.m3u8"]
        );
        assert_eq!(results[1].m3u8.as_deref(), Some("https://cdn.test/b/master.m3u8"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bounded_by_batch_size() {
        let fetcher = Arc::new(StubFetcher::default());
        let resolver = Resolver::new(fetcher.clone(), fast());
        let requests: Vec<_> = (0..7)
            .map(|i| request(&format!("https://kwik.cx/e/{}", i), None))
            .collect();

        let results = resolver.resolve_all(&requests, "https://page.test").await;
        assert_eq!(results.len(), 7);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 3);

        let order: Vec<&str> = results.iter().map(|r| r.original_url.as_str()).collect();
        let expected: Vec<String> = (0..7).map(|i| format!("https://kwik.cx/e/{}", i)).collect();
        assert_eq!(order, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_recorded_after_retries() {
        let fetcher = Arc::new(StubFetcher {
            failing: vec!["https://kwik.cx/e/bad".to_string()],
            ..Default::default()
        });
        let resolver = Resolver::new(fetcher.clone(), ResolverConfig::default());
        let requests = vec![
            request("https://kwik.cx/e/bad", Some("https://site.test")),
            request("https://kwik.cx/e/good", None),
        ];

        let results = resolver.resolve_all(&requests, "https://page.test").await;
        let bad = &results[0];
        assert!(!bad.success);
        assert_eq!(bad.attempts_used, 3);
        assert_eq!(bad.error.as_deref(), Some("HTTP 503"));
        assert!(bad.video_urls.is_empty());
        assert!(results[1].success);

        let calls = fetcher.calls.lock().unwrap();
        let bad_calls: Vec<_> = calls.iter().filter(|(u, _)| u.ends_with("bad")).collect();
        assert_eq!(bad_calls.len(), 3);
        assert!(bad_calls.iter().all(|(_, r)| r == "https://site.test"));
    }

    #[test]
    fn test_resolution_serializes_camel_case() {
        let resolution = KwikResolution {
            original_url: "https://kwik.cx/e/a".into(),
            video_urls: VideoUrls::default(),
            m3u8: None,
            success: false,
            attempts_used: 3,
            error: Some("HTTP 404".into()),
        };
        let json = serde_json::to_value(&resolution).unwrap();
        assert_eq!(json["originalUrl"], "https://kwik.cx/e/a");
        assert_eq!(json["attemptsUsed"], 3);
        assert!(json["videoURLs"]["m3u8"].as_array().unwrap().is_empty());
        assert!(json.get("m3u8").is_none());
    }

    #[tokio::test]
    async fn test_empty_input_fetches_nothing() {
        let fetcher = Arc::new(StubFetcher::default());
        let resolver = Resolver::new(fetcher.clone(), fast());
        assert!(resolver.resolve_all(&[], "https://page.test").await.is_empty());
        assert!(fetcher.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_http_resolver_uses_configured_agent() {
        let config = ResolverConfig {
            user_agent: Some("EpisodeBot/2.0".to_string()),
            ..fast()
        };
        let resolver = Resolver::http(config).unwrap();
        assert_eq!(resolver.config().user_agent.as_deref(), Some("EpisodeBot/2.0"));
    }
}
