//! Types shared by browser sessions: interception policy, the per-session
//! request log and DOM descriptors.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

/// Resource type of an intercepted request, as reported by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Xhr,
    Fetch,
    Other,
}

/// A request seen by the interception handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedRequest {
    pub url: String,
    pub resource_type: ResourceKind,
    /// `Referer` header sent with the request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Script, iframe or video element found in the loaded page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomDescriptor {
    /// Lowercase tag name.
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

/// Collects `script`, `iframe` and `video` elements as [`DomDescriptor`]s.
pub const DOM_DESCRIPTOR_SCRIPT: &str = r#"
Array.from(document.querySelectorAll('script, iframe, video, video source')).map((el) => ({
    tag: el.tagName.toLowerCase(),
    src: el.src || el.getAttribute('data-src') || null,
    id: el.id || null,
    className: (typeof el.className === 'string' && el.className) ? el.className : null
}))
"#;

/// What to do with a paused request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestVerdict {
    Continue,
    Abort,
}

/// Which requests to abort and which to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptionPolicy {
    /// Resource types aborted outright.
    pub blocked: Vec<ResourceKind>,
    /// Host fragments marking an intermediate host (e.g. `kwik.cx`).
    pub intermediate_hosts: Vec<String>,
    /// URL fragments worth keeping as auxiliary media candidates.
    pub candidate_markers: Vec<String>,
}

impl Default for InterceptionPolicy {
    fn default() -> Self {
        Self {
            blocked: vec![
                ResourceKind::Image,
                ResourceKind::Stylesheet,
                ResourceKind::Font,
                ResourceKind::Media,
            ],
            intermediate_hosts: vec!["kwik.cx".to_string(), "kwik.sx".to_string()],
            candidate_markers: vec![".m3u8".to_string(), "stream".to_string(), "video".to_string()],
        }
    }
}

impl InterceptionPolicy {
    pub fn with_intermediate_hosts(mut self, hosts: Vec<String>) -> Self {
        self.intermediate_hosts = hosts;
        self
    }

    pub fn verdict(&self, kind: ResourceKind) -> RequestVerdict {
        if self.blocked.contains(&kind) {
            RequestVerdict::Abort
        } else {
            RequestVerdict::Continue
        }
    }

    pub fn is_intermediate(&self, url: &str) -> bool {
        self.intermediate_hosts.iter().any(|h| url.contains(h.as_str()))
    }

    pub fn is_candidate(&self, url: &str) -> bool {
        self.candidate_markers.iter().any(|m| url.contains(m.as_str()))
    }
}

#[derive(Debug)]
struct LogState {
    requests: Vec<InterceptedRequest>,
    candidates: Vec<String>,
    last_activity: Instant,
}

/// Append-only record of one session's interesting requests.
///
/// Shared between the session and its interception task; owned by a single
/// scrape invocation.
#[derive(Debug, Clone)]
pub struct InterceptionLog {
    state: Arc<Mutex<LogState>>,
}

impl Default for InterceptionLog {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(LogState {
                requests: Vec::new(),
                candidates: Vec::new(),
                last_activity: Instant::now(),
            })),
        }
    }
}

impl InterceptionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a paused request under `policy` and decide its fate.
    pub fn observe(
        &self,
        policy: &InterceptionPolicy,
        url: &str,
        kind: ResourceKind,
        referrer: Option<&str>,
    ) -> RequestVerdict {
        let Ok(mut state) = self.state.lock() else {
            return policy.verdict(kind);
        };
        state.last_activity = Instant::now();

        if policy.is_intermediate(url) {
            state.requests.push(InterceptedRequest {
                url: url.to_string(),
                resource_type: kind,
                referrer: referrer.map(str::to_string),
                observed_at: Utc::now(),
            });
        } else if policy.is_candidate(url) && !state.candidates.iter().any(|c| c == url) {
            state.candidates.push(url.to_string());
        }

        policy.verdict(kind)
    }

    /// Mark network activity without recording anything.
    pub fn touch(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.last_activity = Instant::now();
        }
    }

    pub fn requests(&self) -> Vec<InterceptedRequest> {
        self.state
            .lock()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.candidates.clone())
            .unwrap_or_default()
    }

    /// Time since the last observed request.
    pub fn idle_for(&self) -> Duration {
        self.state
            .lock()
            .map(|s| s.last_activity.elapsed())
            .unwrap_or_default()
    }

    /// Wait until no request has been seen for `quiet`, or `timeout` passes.
    ///
    /// Returns whether the network went quiet.
    pub async fn wait_for_quiet(&self, quiet: Duration, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let idle = self.idle_for();
            if idle >= quiet {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wake = (now + (quiet - idle)).min(deadline);
            tokio::time::sleep_until(wake).await;
        }
    }
}
