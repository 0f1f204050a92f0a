//! Media URL and iframe extraction from arbitrary text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Media container suffixes we scan for, in output order.
pub const MEDIA_SUFFIXES: &[&str] = &["m3u8", "mp4", "webm", "mkv"];

static M3U8_RE: LazyLock<Regex> = LazyLock::new(|| suffix_regex("m3u8"));
static MP4_RE: LazyLock<Regex> = LazyLock::new(|| suffix_regex("mp4"));
static WEBM_RE: LazyLock<Regex> = LazyLock::new(|| suffix_regex("webm"));
static MKV_RE: LazyLock<Regex> = LazyLock::new(|| suffix_regex("mkv"));

static IFRAME_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<iframe\b[^>]*?\ssrc\s*=\s*["']([^"']+)["']"#)
        .expect("iframe regex should compile")
});

fn suffix_regex(suffix: &str) -> Regex {
    Regex::new(&format!(r#"https?://[^\s"']*\.{}[^\s"']*"#, suffix))
        .expect("media URL regex should compile")
}

/// Host substring → provider name.
const PROVIDER_HOSTS: &[(&str, &str)] = &[
    ("kwik", "Kwik"),
    ("streamtape", "Streamtape"),
    ("mp4upload", "Mp4Upload"),
    ("filemoon", "FileMoon"),
    ("dood", "DoodStream"),
    ("streamsb", "StreamSB"),
    ("sbembed", "StreamSB"),
    ("mixdrop", "MixDrop"),
    ("vidstream", "Vidstream"),
    ("gogo", "GogoStream"),
    ("youtube", "YouTube"),
];

/// Media URLs found in a piece of text, grouped by container type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoUrls {
    pub m3u8: Vec<String>,
    pub mp4: Vec<String>,
    pub webm: Vec<String>,
    pub mkv: Vec<String>,
}

impl VideoUrls {
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn total(&self) -> usize {
        self.m3u8.len() + self.mp4.len() + self.webm.len() + self.mkv.len()
    }
}

/// An `<iframe src>` with a provider guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IframeCandidate {
    pub url: String,
    pub provider: String,
}

/// Scan `text` for media URLs by suffix. Order is left-to-right, duplicates kept.
pub fn extract_video_urls(text: &str) -> VideoUrls {
    let collect = |re: &Regex| -> Vec<String> {
        re.find_iter(text).map(|m| m.as_str().to_string()).collect()
    };

    VideoUrls {
        m3u8: collect(&M3U8_RE),
        mp4: collect(&MP4_RE),
        webm: collect(&WEBM_RE),
        mkv: collect(&MKV_RE),
    }
}

/// First HLS playlist URL in `text`, if any.
pub fn extract_m3u8_source(text: &str) -> Option<String> {
    M3U8_RE.find(text).map(|m| m.as_str().to_string())
}

/// Collect iframe sources from HTML with a provider guess for each.
pub fn extract_iframe_candidates(html: &str) -> Vec<IframeCandidate> {
    IFRAME_SRC_RE
        .captures_iter(html)
        .filter_map(|cap| cap.get(1))
        .map(|m| {
            let raw = m.as_str().trim();
            let url = if raw.starts_with("//") {
                format!("https:{}", raw)
            } else {
                raw.to_string()
            };
            let provider = guess_provider(&url).to_string();
            IframeCandidate { url, provider }
        })
        .collect()
}

/// Guess the hosting provider from a URL's host (or the raw string when unparseable).
pub fn guess_provider(url: &str) -> &'static str {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_else(|| url.to_lowercase());

    PROVIDER_HOSTS
        .iter()
        .find(|(needle, _)| host.contains(needle))
        .map(|(_, name)| *name)
        .unwrap_or("Unknown")
}

/// Turn an href into an absolute http(s) URL.
///
/// `//host/path` becomes `https://host/path`, absolute URLs pass through
/// unchanged, and other relative forms are joined onto `base` when given.
pub fn normalize_url(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    if let Some(rest) = href.strip_prefix("//") {
        let candidate = format!("https://{}", rest);
        return Url::parse(&candidate).ok().map(|_| candidate);
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Url::parse(href).ok().map(|_| href.to_string());
    }

    let joined = base?.join(href).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_urls_by_suffix() {
        let urls = extract_video_urls("see http://a.com/x.m3u8 and http://b.com/y.mp4");
        assert_eq!(urls.m3u8, vec!["http://a.com/x.m3u8"]);
        assert_eq!(urls.mp4, vec!["http://b.com/y.mp4"]);
        assert!(urls.webm.is_empty());
        assert!(urls.mkv.is_empty());
        assert_eq!(urls.total(), 2);
    }

    #[test]
    fn test_extract_video_urls_keeps_duplicates_and_query() {
        let text = r#"src="https://cdn.x/a/uwu.m3u8?token=1" ... 'https://cdn.x/a/uwu.m3u8?token=1'"#;
        let urls = extract_video_urls(text);
        assert_eq!(
            urls.m3u8,
            vec![
                "https://cdn.x/a/uwu.m3u8?token=1",
                "https://cdn.x/a/uwu.m3u8?token=1"
            ]
        );
    }

    #[test]
    fn test_extract_video_urls_empty() {
        let urls = extract_video_urls("nothing to see here");
        assert!(urls.is_empty());
        assert_eq!(urls, VideoUrls::default());
    }

    #[test]
    fn test_extract_m3u8_source_first_match() {
        let text = "x https://one.test/a.m3u8 y https://two.test/b.m3u8";
        assert_eq!(
            extract_m3u8_source(text).as_deref(),
            Some("https://one.test/a.m3u8")
        );
        assert_eq!(extract_m3u8_source("none"), None);
    }

    #[test]
    fn test_iframe_candidates_provider_guess() {
        let html = r#"
            <iframe width="100%" src="https://kwik.cx/e/abc123"></iframe>
            <IFRAME SRC='//player.unknownhost.net/embed/9'></IFRAME>
        "#;
        let found = extract_iframe_candidates(html);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].url, "https://kwik.cx/e/abc123");
        assert_eq!(found[0].provider, "Kwik");
        assert_eq!(found[1].url, "https://player.unknownhost.net/embed/9");
        assert_eq!(found[1].provider, "Unknown");
    }

    #[test]
    fn test_normalize_url_forms() {
        assert_eq!(
            normalize_url("//cdn.test/f", None).as_deref(),
            Some("https://cdn.test/f")
        );
        assert_eq!(
            normalize_url("http://a.test/x", None).as_deref(),
            Some("http://a.test/x")
        );
        assert_eq!(normalize_url("/relative", None), None);

        let base = Url::parse("https://site.test/anime/ep-1").unwrap();
        assert_eq!(
            normalize_url("/dl/2", Some(&base)).as_deref(),
            Some("https://site.test/dl/2")
        );
        assert_eq!(normalize_url("#top", Some(&base)), None);
        assert_eq!(normalize_url("javascript:void(0)", Some(&base)), None);
    }
}
