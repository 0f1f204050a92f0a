//! Controller stages and interstitial detection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a scrape invocation currently is. `Failed` is reachable from every
/// non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Init,
    BrowserReady,
    Navigating,
    InterstitialCheck,
    Loaded,
    ContentExtracted,
    Analyzing,
    ResolvingIntermediates,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::BrowserReady => "browser ready",
            Stage::Navigating => "navigating",
            Stage::InterstitialCheck => "interstitial check",
            Stage::Loaded => "loaded",
            Stage::ContentExtracted => "content extracted",
            Stage::Analyzing => "analyzing",
            Stage::ResolvingIntermediates => "resolving intermediates",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of transient page standing between navigation and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interstitial {
    /// Anti-bot challenge that resolves on its own.
    Challenge,
    /// Redirect notice that may need a confirmation click.
    Redirect,
}

const CHALLENGE_TITLES: &[&str] = &["just a moment", "ddos-guard", "checking your browser"];
const CHALLENGE_URL_MARKERS: &[&str] = &["/cdn-cgi/challenge", "__cf_chl", "ddos-guard"];
const REDIRECT_TITLES: &[&str] = &["redirecting", "continue"];

/// Classify a page by its title and URL.
pub fn detect_interstitial(title: &str, url: &str) -> Option<Interstitial> {
    let title = title.to_lowercase();
    let url = url.to_lowercase();

    if CHALLENGE_TITLES.iter().any(|s| title.contains(s))
        || CHALLENGE_URL_MARKERS.iter().any(|s| url.contains(s))
    {
        return Some(Interstitial::Challenge);
    }
    if REDIRECT_TITLES.iter().any(|s| title.contains(s)) {
        return Some(Interstitial::Redirect);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_challenge_pages() {
        assert_eq!(
            detect_interstitial("Just a moment...", "https://site.test/"),
            Some(Interstitial::Challenge)
        );
        assert_eq!(
            detect_interstitial("DDoS-Guard", "https://site.test/"),
            Some(Interstitial::Challenge)
        );
        assert_eq!(
            detect_interstitial("", "https://site.test/cdn-cgi/challenge-platform/x"),
            Some(Interstitial::Challenge)
        );
    }

    #[test]
    fn test_detect_redirect_pages() {
        assert_eq!(
            detect_interstitial("Redirecting to episode", "https://site.test/r"),
            Some(Interstitial::Redirect)
        );
        assert_eq!(
            detect_interstitial("Click to Continue", "https://site.test/r"),
            Some(Interstitial::Redirect)
        );
    }

    #[test]
    fn test_regular_page_is_not_interstitial() {
        assert_eq!(
            detect_interstitial("One Piece Episode 1071", "https://site.test/play/1"),
            None
        );
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Analyzing.is_terminal());
        assert_eq!(Stage::ResolvingIntermediates.to_string(), "resolving intermediates");
    }
}
