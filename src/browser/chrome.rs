//! chromiumoxide implementation of the browser traits.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::BrowserEngineConfig;
use super::types::{
    InterceptedRequest, InterceptionLog, InterceptionPolicy, RequestVerdict, ResourceKind,
};
use super::{BrowserError, BrowserLauncher, BrowserSession};

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Stealth evasion scripts installed on every new document.
const STEALTH_SCRIPTS: &[&str] = &[
    // Remove webdriver property
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    // Fix chrome object
    r#"
    window.chrome = window.chrome || { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };
    "#,
    // Fix languages
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });
    "#,
    // Fix plugins (make it look like regular Chrome)
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' }
        ],
        configurable: true
    });
    "#,
];

fn resource_kind(resource: &ResourceType) -> ResourceKind {
    match resource {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::Xhr => ResourceKind::Xhr,
        ResourceType::Fetch => ResourceKind::Fetch,
        _ => ResourceKind::Other,
    }
}

fn protocol<E: std::fmt::Display>(e: E) -> BrowserError {
    BrowserError::Protocol(e.to_string())
}

/// Launches local Chrome or connects to a remote DevTools endpoint.
pub struct ChromeLauncher {
    config: BrowserEngineConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }

    /// Find Chrome executable.
    fn find_chrome(&self) -> Result<PathBuf, BrowserError> {
        if let Some(ref path) = self.config.executable {
            if path.exists() {
                return Ok(path.clone());
            }
            warn!("Configured Chrome executable {:?} does not exist", path);
        }

        for path in CHROME_PATHS {
            let p = Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        // Check if in PATH via `which`
        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(PathBuf::from(path));
                    }
                }
            }
        }

        Err(BrowserError::Launch(
            "Chrome/Chromium not found. Install it or set CHROME_EXECUTABLE".to_string(),
        ))
    }

    async fn launch_local(&self) -> Result<(Browser, JoinHandle<()>), BrowserError> {
        info!("Launching browser (headless={})", self.config.headless);

        let chrome_path = self.find_chrome()?;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(Duration::from_secs(self.config.timeout));

        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| BrowserError::Launch(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handle))
    }

    async fn connect_remote(&self, url: &str) -> Result<(Browser, JoinHandle<()>), BrowserError> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, self.config.timeout
        );

        let ws_url = if url.contains("/devtools/browser/") {
            url.to_string()
        } else {
            // Get WebSocket URL from the /json/version endpoint
            let http_url = url
                .replace("ws://", "http://")
                .replace("wss://", "https://");
            let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

            let resp: Value = reqwest::Client::new()
                .get(&version_url)
                .send()
                .await
                .map_err(|e| BrowserError::Launch(format!("Remote browser unreachable: {}", e)))?
                .json()
                .await
                .map_err(|e| BrowserError::Launch(format!("Bad browser version info: {}", e)))?;

            resp.get("webSocketDebuggerUrl")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    BrowserError::Launch("No webSocketDebuggerUrl in response".to_string())
                })?
        };

        debug!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.config.timeout),
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handle))
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let remote = self.config.remote_url.is_some();
        let (browser, handler) = match self.config.remote_url {
            Some(ref url) => self.connect_remote(url).await?,
            None => self.launch_local().await?,
        };

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                release(browser, None, handler, remote).await;
                return Err(BrowserError::Launch(format!("Failed to open page: {}", e)));
            }
        };

        let user_agent = self
            .config
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        if let Err(e) = page
            .execute(SetUserAgentOverrideParams::new(user_agent))
            .await
        {
            release(browser, Some(page), handler, remote).await;
            return Err(protocol(e));
        }

        if self.config.stealth {
            for script in STEALTH_SCRIPTS {
                if let Err(e) = page.evaluate_on_new_document(*script).await {
                    debug!("Stealth script injection skipped: {}", e);
                }
            }
        }

        Ok(Box::new(ChromeSession {
            browser: Mutex::new(Some(browser)),
            page,
            handler,
            remote,
            log: InterceptionLog::new(),
            interceptor: Mutex::new(None),
        }))
    }
}

/// Tear down a half-initialised launch. Remote browsers are left running.
async fn release(mut browser: Browser, page: Option<Page>, handler: JoinHandle<()>, remote: bool) {
    if let Some(page) = page {
        if let Err(e) = page.close().await {
            debug!("Page close failed: {}", e);
        }
    }
    if !remote {
        if let Err(e) = browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        let _ = browser.wait().await;
    }
    handler.abort();
}

/// Chrome answers `Page.navigate` for unreachable hosts with an error text
/// and then loads its own error page.
fn navigation_outcome(error_text: Option<&str>) -> Result<(), BrowserError> {
    match error_text {
        Some(text) if !text.is_empty() => Err(BrowserError::Navigation(text.to_string())),
        _ => Ok(()),
    }
}

/// A single page plus its interception task.
pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
    /// Remote browsers are left running on close.
    remote: bool,
    log: InterceptionLog,
    interceptor: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn enable_interception(&self, policy: InterceptionPolicy) -> Result<(), BrowserError> {
        let mut events = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(protocol)?;

        let pattern = RequestPattern::builder()
            .url_pattern("*")
            .request_stage(RequestStage::Request)
            .build();
        self.page
            .execute(EnableParams::builder().pattern(pattern).build())
            .await
            .map_err(protocol)?;

        let page = self.page.clone();
        let log = self.log.clone();
        let policy = Arc::new(policy);
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let referrer = event
                    .request
                    .headers
                    .inner()
                    .get("Referer")
                    .or_else(|| event.request.headers.inner().get("referer"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);

                let verdict = log.observe(
                    &policy,
                    &event.request.url,
                    resource_kind(&event.resource_type),
                    referrer.as_deref(),
                );

                let result = match verdict {
                    RequestVerdict::Continue => page
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ()),
                    RequestVerdict::Abort => page
                        .execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ()),
                };
                if let Err(e) = result {
                    debug!("Could not resolve paused request {}: {}", event.request.url, e);
                }
            }
        });

        *self.interceptor.lock().await = Some(task);
        Ok(())
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Navigation)?;

        self.log.touch();
        let nav = async {
            let response = self
                .page
                .execute(params)
                .await
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            navigation_outcome(response.result.error_text.as_deref())?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;
            Ok::<(), BrowserError>(())
        };

        tokio::time::timeout(timeout, nav)
            .await
            .map_err(|_| BrowserError::Timeout(timeout))?
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self.page.get_title().await.map_err(protocol)?.unwrap_or_default())
    }

    async fn url(&self) -> Result<String, BrowserError> {
        Ok(self.page.url().await.map_err(protocol)?.unwrap_or_default())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, BrowserError> {
        let poll = async {
            loop {
                if self.page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        };
        Ok(tokio::time::timeout(timeout, poll).await.is_ok())
    }

    async fn wait_for_network_idle(
        &self,
        quiet: Duration,
        timeout: Duration,
    ) -> Result<bool, BrowserError> {
        Ok(self.log.wait_for_quiet(quiet, timeout).await)
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(protocol)?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.page.content().await.map_err(protocol)
    }

    async fn click(&self, selector: &str) -> Result<bool, BrowserError> {
        match self.page.find_element(selector).await {
            Ok(element) => {
                element.click().await.map_err(protocol)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), BrowserError> {
        tokio::time::timeout(timeout, self.page.wait_for_navigation())
            .await
            .map_err(|_| BrowserError::Timeout(timeout))?
            .map(|_| ())
            .map_err(|e| BrowserError::Navigation(e.to_string()))
    }

    fn intercepted(&self) -> Vec<InterceptedRequest> {
        self.log.requests()
    }

    fn candidates(&self) -> Vec<String> {
        self.log.candidates()
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if let Some(task) = self.interceptor.lock().await.take() {
            task.abort();
        }

        // Close the page to prevent tab accumulation
        let page_result = self.page.clone().close().await;

        if let Some(mut browser) = self.browser.lock().await.take() {
            if !self.remote {
                if let Err(e) = browser.close().await {
                    debug!("Browser close failed: {}", e);
                }
                let _ = browser.wait().await;
            }
        }
        self.handler.abort();

        page_result.map_err(protocol)
    }
}
