//! Interception-and-resolution controller.
//!
//! One call to [`ScrapeController::scrape`] drives a browser session
//! through the stages in [`Stage`], captures intermediate-host traffic,
//! analyzes the page and resolves what was captured. It always returns a
//! [`ScrapeResult`]; failures are reported in its `error` field and the
//! browser session is closed on every path.

mod config;
mod result;
mod stage;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::analysis::PageAnalyzer;
use crate::browser::{
    BrowserLauncher, BrowserSession, DomDescriptor, InterceptedRequest, DOM_DESCRIPTOR_SCRIPT,
};
use crate::progress::{NoopSink, ProgressEvent, ProgressSink};
use crate::resolve::{unique_targets, Resolver};

pub use config::ScrapeConfig;
pub use result::{KwikData, PageInfo, PageSnapshot, ScrapeResult, Timings};
pub use stage::{detect_interstitial, Interstitial, Stage};

const COMPONENT: &str = "scraper";

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Resolve as soon as either wait succeeds, otherwise once both gave up.
async fn either_ready<A, B>(a: A, b: B) -> bool
where
    A: std::future::Future<Output = bool>,
    B: std::future::Future<Output = bool>,
{
    tokio::pin!(a);
    tokio::pin!(b);
    tokio::select! {
        ready = &mut a => ready || b.await,
        ready = &mut b => ready || a.await,
    }
}

/// A fatal stage error.
struct StageFailure {
    stage: Stage,
    message: String,
}

impl StageFailure {
    fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// What the browser half of the pipeline captured.
struct Capture {
    snapshot: PageSnapshot,
    intercepted: Vec<InterceptedRequest>,
    candidates: Vec<String>,
}

pub struct ScrapeController {
    launcher: Arc<dyn BrowserLauncher>,
    analyzer: PageAnalyzer,
    resolver: Resolver,
    config: ScrapeConfig,
}

impl ScrapeController {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        analyzer: PageAnalyzer,
        resolver: Resolver,
        config: ScrapeConfig,
    ) -> Self {
        Self {
            launcher,
            analyzer,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    fn enter(&self, stage: Stage, sink: &dyn ProgressSink) {
        if stage.is_terminal() {
            info!("Stage: {}", stage);
        } else {
            debug!("Stage: {}", stage);
        }
        sink.emit(ProgressEvent::info(COMPONENT, format!("Stage: {}", stage)));
    }

    pub async fn scrape(&self, url: &str) -> ScrapeResult {
        self.scrape_with(url, &NoopSink).await
    }

    /// Run the whole pipeline for `url`, reporting progress to `sink`.
    pub async fn scrape_with(&self, url: &str, sink: &dyn ProgressSink) -> ScrapeResult {
        let started = Instant::now();
        let mut timings = Timings::default();
        info!("Scraping {}", url);
        self.enter(Stage::Init, sink);

        let session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(e) => {
                timings.total_ms = elapsed_ms(started);
                return self.fail(url, StageFailure::new(Stage::Init, e.to_string()), timings, sink);
            }
        };
        self.enter(Stage::BrowserReady, sink);

        let captured = self.capture(session.as_ref(), url, &mut timings, sink).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session: {}", e);
        }

        let capture = match captured {
            Ok(capture) => capture,
            Err(failure) => {
                timings.total_ms = elapsed_ms(started);
                return self.fail(url, failure, timings, sink);
            }
        };

        self.enter(Stage::Analyzing, sink);
        let analysis_started = Instant::now();
        let base = Url::parse(&capture.snapshot.url).ok();
        let analysis = self
            .analyzer
            .analyze_with(&capture.snapshot.html, base.as_ref(), sink)
            .await;
        timings.analysis_ms = Some(elapsed_ms(analysis_started));

        let page_url = capture.snapshot.url.clone();
        let targets = unique_targets(&capture.intercepted, &page_url);
        let referrer = targets
            .first()
            .map(|t| t.referrer.clone())
            .unwrap_or_else(|| page_url.clone());

        let sources = if targets.is_empty() {
            sink.emit(ProgressEvent::info(COMPONENT, "No intermediate URLs intercepted"));
            Vec::new()
        } else {
            self.enter(Stage::ResolvingIntermediates, sink);
            let resolution_started = Instant::now();
            let sources = self
                .resolver
                .resolve_all_with(&capture.intercepted, &page_url, sink)
                .await;
            timings.resolution_ms = Some(elapsed_ms(resolution_started));
            sources
        };

        timings.total_ms = elapsed_ms(started);
        self.enter(Stage::Done, sink);
        info!(
            "Scrape of {} finished in {}ms: {} download link(s), {} intermediate URL(s)",
            url,
            timings.total_ms,
            analysis.download_links.len(),
            targets.len()
        );

        ScrapeResult {
            url: url.to_string(),
            download_links: analysis.download_links.clone(),
            analysis,
            kwik: KwikData {
                urls: targets.into_iter().map(|t| t.url).collect(),
                sources,
            },
            candidate_urls: capture.candidates,
            page_info: capture.snapshot.info(),
            referrer,
            timings,
            error: None,
            failed_stage: None,
        }
    }

    fn fail(
        &self,
        url: &str,
        failure: StageFailure,
        timings: Timings,
        sink: &dyn ProgressSink,
    ) -> ScrapeResult {
        warn!("Scrape of {} failed during {}: {}", url, failure.stage, failure.message);
        sink.emit(ProgressEvent::error(
            COMPONENT,
            format!("Failed during {}: {}", failure.stage, failure.message),
        ));
        self.enter(Stage::Failed, sink);
        ScrapeResult::failed(url, failure.stage, failure.message, timings)
    }

    /// Browser half: BrowserReady through ContentExtracted.
    async fn capture(
        &self,
        session: &dyn BrowserSession,
        url: &str,
        timings: &mut Timings,
        sink: &dyn ProgressSink,
    ) -> Result<Capture, StageFailure> {
        session
            .enable_interception(self.config.interception_policy())
            .await
            .map_err(|e| StageFailure::new(Stage::BrowserReady, e.to_string()))?;

        self.enter(Stage::Navigating, sink);
        let navigation_started = Instant::now();
        let navigated = self.navigate(session, url, sink).await;
        timings.navigation_ms = Some(elapsed_ms(navigation_started));
        navigated?;

        self.enter(Stage::InterstitialCheck, sink);
        self.pass_interstitial(session, sink).await;

        self.enter(Stage::Loaded, sink);
        let extraction_started = Instant::now();
        let snapshot = self.snapshot(session, url).await?;
        timings.content_extraction_ms = Some(elapsed_ms(extraction_started));
        self.enter(Stage::ContentExtracted, sink);

        Ok(Capture {
            snapshot,
            intercepted: session.intercepted(),
            candidates: session.candidates(),
        })
    }

    async fn navigate(
        &self,
        session: &dyn BrowserSession,
        url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<(), StageFailure> {
        let policy = self.config.navigation_policy();
        let timeout = Duration::from_secs(self.config.navigation_timeout_secs);
        let quiet = Duration::from_millis(self.config.network_quiet_ms);
        let idle_timeout = Duration::from_millis(self.config.navigation_idle_timeout_ms);

        policy
            .run(|attempt| async move {
                sink.emit(ProgressEvent::info(
                    COMPONENT,
                    format!("Navigating to {} (attempt {}/{})", url, attempt, policy.max_attempts),
                ));
                let result = session.navigate(url, timeout).await;
                if let Err(ref e) = result {
                    sink.emit(ProgressEvent::warn(
                        COMPONENT,
                        format!("Navigation attempt {} failed: {}", attempt, e),
                    ));
                    return result;
                }
                match session.wait_for_network_idle(quiet, idle_timeout).await {
                    Ok(true) => {}
                    Ok(false) => debug!("Network still busy after {:?}, continuing", idle_timeout),
                    Err(e) => debug!("Network idle wait failed: {}", e),
                }
                Ok(())
            })
            .await
            .map(|_| ())
            .map_err(|e| {
                StageFailure::new(
                    Stage::Navigating,
                    format!("Navigation failed after {} attempt(s): {}", e.attempts, e.last_error),
                )
            })
    }

    /// Wait out challenge and redirect pages. Never fails the scrape.
    async fn pass_interstitial(&self, session: &dyn BrowserSession, sink: &dyn ProgressSink) {
        let title = session.title().await.unwrap_or_default();
        let current = session.url().await.unwrap_or_default();
        let Some(kind) = detect_interstitial(&title, &current) else {
            return;
        };

        sink.emit(ProgressEvent::info(
            COMPONENT,
            format!("Interstitial page detected ({:?}: {:?}), waiting", kind, title),
        ));
        tokio::time::sleep(Duration::from_millis(self.config.interstitial_wait_ms)).await;

        let title = session.title().await.unwrap_or_default();
        let current = session.url().await.unwrap_or_default();
        let Some(kind) = detect_interstitial(&title, &current) else {
            info!("Interstitial resolved on its own");
            return;
        };

        if kind == Interstitial::Redirect {
            if let Some(ref selector) = self.config.interstitial_confirm_selector {
                match session.click(selector).await {
                    Ok(true) => debug!("Clicked interstitial confirmation"),
                    Ok(false) => debug!("No confirmation element matched {}", selector),
                    Err(e) => debug!("Confirmation click failed: {}", e),
                }
            }
        }

        let timeout = Duration::from_millis(self.config.interstitial_navigation_timeout_ms);
        if let Err(e) = session.wait_for_navigation(timeout).await {
            warn!("Interstitial did not resolve: {}", e);
            sink.emit(ProgressEvent::warn(
                COMPONENT,
                format!("Interstitial did not resolve: {}", e),
            ));
        }
    }

    async fn snapshot(
        &self,
        session: &dyn BrowserSession,
        requested: &str,
    ) -> Result<PageSnapshot, StageFailure> {
        let quiet = Duration::from_millis(self.config.network_quiet_ms);
        let idle_timeout = Duration::from_millis(self.config.content_idle_timeout_ms);
        let selector = self.config.player_selector();
        let selector_timeout = Duration::from_millis(self.config.player_selector_timeout_ms);

        let ready = either_ready(
            async {
                session
                    .wait_for_network_idle(quiet, idle_timeout)
                    .await
                    .unwrap_or(false)
            },
            async {
                session
                    .wait_for_selector(&selector, selector_timeout)
                    .await
                    .unwrap_or(false)
            },
        )
        .await;
        if !ready {
            debug!("Page not quiet and no player found, snapshotting anyway");
        }

        tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;

        let html = session
            .content()
            .await
            .map_err(|e| StageFailure::new(Stage::Loaded, e.to_string()))?;
        let url = session
            .url()
            .await
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| requested.to_string());
        let title = session.title().await.unwrap_or_default();
        let elements = match session.evaluate(DOM_DESCRIPTOR_SCRIPT).await {
            Ok(value) => serde_json::from_value::<Vec<DomDescriptor>>(value).unwrap_or_default(),
            Err(e) => {
                debug!("DOM descriptor collection failed: {}", e);
                Vec::new()
            }
        };

        Ok(PageSnapshot {
            html,
            url,
            title,
            elements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        basic_download_links_with_base, basic_streaming_sources, AnalyzerConfig,
        MANUAL_ANALYSIS_REQUIRED,
    };
    use crate::browser::{
        BrowserError, InterceptionLog, InterceptionPolicy, ResourceKind,
    };
    use crate::llm::{LlmError, OutputSchema, StructuredLlm};
    use crate::resolve::{IntermediateFetcher, ResolveError, ResolverConfig};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    const PAGE_URL: &str = "https://anime.test/play/ep-1";
    const PAGE: &str = r#"<html><head><title>Frieren Episode 3</title></head><body>
        <div class="player"><iframe src="https://kwik.cx/e/abc"></iframe></div>
        <div id="pickDownload"><a href="/dl/720">Kwik 720p sub</a></div>
    </body></html>"#;

    /// Scripted session state shared with the test.
    #[derive(Default)]
    struct Script {
        navigation_failures: u32,
        titles: Vec<&'static str>,
        traffic: Vec<(&'static str, ResourceKind, Option<&'static str>)>,
        fail_content: bool,
    }

    #[derive(Default)]
    struct Tracker {
        closed: AtomicBool,
        navigations: AtomicU32,
        clicks: Mutex<Vec<String>>,
        title_calls: AtomicU32,
    }

    struct StubSession {
        script: Arc<Script>,
        tracker: Arc<Tracker>,
        log: InterceptionLog,
        policy: Mutex<Option<InterceptionPolicy>>,
    }

    #[async_trait]
    impl BrowserSession for StubSession {
        async fn enable_interception(&self, policy: InterceptionPolicy) -> Result<(), BrowserError> {
            *self.policy.lock().unwrap() = Some(policy);
            Ok(())
        }

        async fn navigate(&self, _url: &str, _timeout: Duration) -> Result<(), BrowserError> {
            let n = self.tracker.navigations.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.script.navigation_failures {
                return Err(BrowserError::Navigation("net::ERR_CONNECTION_RESET".into()));
            }
            let policy = self.policy.lock().unwrap().clone().unwrap_or_default();
            for (url, kind, referrer) in &self.script.traffic {
                self.log.observe(&policy, url, *kind, *referrer);
            }
            Ok(())
        }

        async fn title(&self) -> Result<String, BrowserError> {
            let n = self.tracker.title_calls.fetch_add(1, Ordering::SeqCst) as usize;
            let titles = &self.script.titles;
            Ok(titles
                .get(n)
                .or(titles.last())
                .copied()
                .unwrap_or("Frieren Episode 3")
                .to_string())
        }

        async fn url(&self) -> Result<String, BrowserError> {
            Ok(PAGE_URL.to_string())
        }

        async fn wait_for_selector(&self, _: &str, _: Duration) -> Result<bool, BrowserError> {
            Ok(true)
        }

        async fn wait_for_network_idle(&self, _: Duration, _: Duration) -> Result<bool, BrowserError> {
            Ok(true)
        }

        async fn evaluate(&self, _script: &str) -> Result<Value, BrowserError> {
            Ok(json!([{"tag": "iframe", "src": "https://kwik.cx/e/abc"}]))
        }

        async fn content(&self) -> Result<String, BrowserError> {
            if self.script.fail_content {
                return Err(BrowserError::Protocol("target closed".into()));
            }
            Ok(PAGE.to_string())
        }

        async fn click(&self, selector: &str) -> Result<bool, BrowserError> {
            self.tracker.clicks.lock().unwrap().push(selector.to_string());
            Ok(true)
        }

        async fn wait_for_navigation(&self, _: Duration) -> Result<(), BrowserError> {
            Ok(())
        }

        fn intercepted(&self) -> Vec<InterceptedRequest> {
            self.log.requests()
        }

        fn candidates(&self) -> Vec<String> {
            self.log.candidates()
        }

        async fn close(&self) -> Result<(), BrowserError> {
            self.tracker.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubLauncher {
        script: Arc<Script>,
        tracker: Arc<Tracker>,
        fail: bool,
    }

    #[async_trait]
    impl BrowserLauncher for StubLauncher {
        async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
            if self.fail {
                return Err(BrowserError::Launch("no chrome".into()));
            }
            Ok(Box::new(StubSession {
                script: self.script.clone(),
                tracker: self.tracker.clone(),
                log: InterceptionLog::new(),
                policy: Mutex::new(None),
            }))
        }
    }

    struct DownLlm;

    #[async_trait]
    impl StructuredLlm for DownLlm {
        async fn generate(&self, _: &str, _: &OutputSchema) -> Result<Value, LlmError> {
            Err(LlmError::Connection("connection refused".into()))
        }
    }

    struct EchoFetcher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl IntermediateFetcher for EchoFetcher {
        async fn fetch(&self, url: &str, _referrer: &str) -> Result<String, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("var s = '{}/index.m3u8';", url.replace("kwik.cx", "cdn.test")))
        }
    }

    fn controller(script: Script, fail_launch: bool) -> (ScrapeController, Arc<Tracker>, Arc<EchoFetcher>) {
        let tracker = Arc::new(Tracker::default());
        let fetcher = Arc::new(EchoFetcher {
            calls: AtomicU32::new(0),
        });
        let config = ScrapeConfig::default().without_waits();
        let launcher = StubLauncher {
            script: Arc::new(script),
            tracker: tracker.clone(),
            fail: fail_launch,
        };
        let analyzer = PageAnalyzer::new(
            Arc::new(DownLlm),
            AnalyzerConfig {
                retry_delay_ms: 0,
                ..Default::default()
            },
        );
        let resolver = Resolver::new(
            fetcher.clone(),
            ResolverConfig {
                retry_delay_ms: 0,
                ..Default::default()
            },
        );
        (
            ScrapeController::new(Arc::new(launcher), analyzer, resolver, config),
            tracker,
            fetcher,
        )
    }

    #[tokio::test]
    async fn test_full_pipeline_with_failing_llm() {
        let script = Script {
            traffic: vec![
                ("https://kwik.cx/e/abc", ResourceKind::Document, Some("https://anime.test/")),
                ("https://kwik.cx/e/abc", ResourceKind::Document, Some("https://anime.test/")),
                ("https://kwik.cx/e/def", ResourceKind::Document, None),
                ("https://anime.test/hls/stream.m3u8", ResourceKind::Xhr, None),
            ],
            ..Default::default()
        };
        let (controller, tracker, fetcher) = controller(script, false);

        let result = controller.scrape(PAGE_URL).await;
        assert!(result.is_success(), "{:?}", result.error);
        assert!(tracker.closed.load(Ordering::SeqCst));

        let base = Url::parse(PAGE_URL).unwrap();
        assert_eq!(result.download_links, basic_download_links_with_base(PAGE, Some(&base)));
        assert_eq!(result.download_links[0].url, "https://anime.test/dl/720");
        assert_eq!(result.analysis.extraction_strategy, MANUAL_ANALYSIS_REQUIRED);

        assert_eq!(result.kwik.urls, vec!["https://kwik.cx/e/abc", "https://kwik.cx/e/def"]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.kwik.sources.len(), 2);
        assert_eq!(
            result.kwik.sources[0].video_urls.m3u8,
            vec!["https://cdn.test/e/abc/index.m3u8"]
        );
        assert_eq!(result.referrer, "https://anime.test/");
        assert_eq!(result.candidate_urls, vec!["https://anime.test/hls/stream.m3u8"]);
        assert_eq!(result.page_info.title, "Frieren Episode 3");
        assert_eq!(result.page_info.elements[0].tag, "iframe");
        assert!(result.timings.analysis_ms.is_some());
        assert!(result.timings.resolution_ms.is_some());
    }

    #[tokio::test]
    async fn test_no_interception_gives_empty_kwik() {
        let (controller, _, fetcher) = controller(Script::default(), false);
        let result = controller.scrape(PAGE_URL).await;
        assert!(result.is_success());
        let base = Url::parse(PAGE_URL).unwrap();
        assert_eq!(result.download_links, basic_download_links_with_base(PAGE, Some(&base)));
        assert_eq!(result.analysis.streaming_sources, basic_streaming_sources(PAGE));
        assert!(result.kwik.urls.is_empty());
        assert!(result.kwik.sources.is_empty());
        assert_eq!(result.referrer, PAGE_URL);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(result.timings.resolution_ms.is_none());
    }

    #[tokio::test]
    async fn test_navigation_retried_then_succeeds() {
        let script = Script {
            navigation_failures: 2,
            ..Default::default()
        };
        let (controller, tracker, _) = controller(script, false);
        let result = controller.scrape(PAGE_URL).await;
        assert!(result.is_success());
        assert_eq!(tracker.navigations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_navigation_exhaustion_fails_and_closes() {
        let script = Script {
            navigation_failures: 10,
            ..Default::default()
        };
        let (controller, tracker, _) = controller(script, false);
        let result = controller.scrape(PAGE_URL).await;

        assert_eq!(tracker.navigations.load(Ordering::SeqCst), 3);
        assert!(tracker.closed.load(Ordering::SeqCst));
        assert_eq!(result.failed_stage, Some(Stage::Navigating));
        assert!(result.timings.navigation_ms.is_some());
        assert!(result.error.unwrap().contains("ERR_CONNECTION_RESET"));
        assert!(result.download_links.is_empty());
        assert!(result.kwik.sources.is_empty());
        assert!(result.timings.analysis_ms.is_none());
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let (controller, tracker, _) = controller(Script::default(), true);
        let result = controller.scrape(PAGE_URL).await;
        assert_eq!(result.failed_stage, Some(Stage::Init));
        assert!(result.error.unwrap().contains("no chrome"));
        assert!(!tracker.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_content_failure_still_closes_session() {
        let script = Script {
            fail_content: true,
            ..Default::default()
        };
        let (controller, tracker, _) = controller(script, false);
        let result = controller.scrape(PAGE_URL).await;
        assert_eq!(result.failed_stage, Some(Stage::Loaded));
        assert!(tracker.closed.load(Ordering::SeqCst));
        assert!(result.timings.navigation_ms.is_some());
    }

    #[tokio::test]
    async fn test_redirect_interstitial_clicks_confirm_once() {
        let script = Script {
            titles: vec!["Redirecting...", "Redirecting...", "Frieren Episode 3"],
            ..Default::default()
        };
        let (controller, tracker, _) = controller(script, false);
        let result = controller.scrape(PAGE_URL).await;
        assert!(result.is_success());
        assert_eq!(tracker.clicks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_challenge_that_clears_needs_no_click() {
        let script = Script {
            titles: vec!["Just a moment...", "Frieren Episode 3"],
            ..Default::default()
        };
        let (controller, tracker, _) = controller(script, false);
        let result = controller.scrape(PAGE_URL).await;
        assert!(result.is_success());
        assert!(tracker.clicks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_either_ready() {
        assert!(either_ready(async { false }, async { true }).await);
        assert!(either_ready(async { true }, std::future::pending()).await);
        assert!(!either_ready(async { false }, async { false }).await);
    }
}
