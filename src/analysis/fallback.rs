//! Deterministic page analysis without an LLM.
//!
//! Used as the "no AI" path and as the terminal fallback when every LLM
//! attempt fails. None of these functions can fail: a miss is an empty
//! collection or a `None` field.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::model::{
    AnalysisResult, DownloadLink, EpisodeInfo, ObfuscationTechnique, PageStructure,
    StreamingSource, TechnicalDetails, DEFAULT_AUDIO, UNKNOWN,
};
use crate::extract::{extract_iframe_candidates, normalize_url, MEDIA_SUFFIXES};

/// Anchor text that marks a download link.
const DOWNLOAD_WORDS: &[&str] = &["download", "mirror", "server"];

/// Id or class fragment that marks a container of download anchors.
const DOWNLOAD_SECTION_MARKER: &str = "download";

/// Host substrings that mark an iframe as a streaming player.
const STREAMING_HOST_WORDS: &[&str] = &["kwik", "stream", "video", "player"];

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector should parse"));
static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector should parse"));

static QUALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+p|4k|hd|sd)\b").expect("quality regex should compile"));
static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s?(kb|mb|gb)\b").expect("size regex should compile")
});
static FORMAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(mp4|mkv|webm|m3u8)\b").expect("format regex should compile"));
static PACKED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eval\(function\(p,\s*a,\s*c,\s*k,\s*e,\s*[dr]\)")
        .expect("packed regex should compile")
});
static AJAX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:fetch|\$\.get|\$\.post|\$\.ajax|axios\.get|axios\.post)\(\s*["']([^"']+)["']"#)
        .expect("ajax regex should compile")
});
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number regex should compile"));

/// Provider keywords, matched as whole words in anchor text.
static PROVIDERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bkwik\b", "Kwik"),
        (r"(?i)\bwap\b", "WAP"),
        (r"(?i)\byameii\b", "Yameii"),
        (r"(?i)\bpahe\b", "Pahe"),
        (r"(?i)\bmega\b", "Mega"),
        (r"(?i)\bg(?:oogle\s?)?drive\b", "Google Drive"),
        (r"(?i)\bmediafire\b", "Mediafire"),
        (r"(?i)\bpixeldrain\b", "Pixeldrain"),
        (r"(?i)\bstreamtape\b", "Streamtape"),
        (r"(?i)\bmp4upload\b", "Mp4Upload"),
        (r"(?i)\bfilemoon\b", "FileMoon"),
        (r"(?i)\bdood(?:stream)?\b", "DoodStream"),
        (r"(?i)\buptobox\b", "Uptobox"),
    ]
    .into_iter()
    .map(|(pattern, name)| (Regex::new(pattern).expect("provider regex should compile"), name))
    .collect()
});

/// Substring → framework/player name, checked against lowercased HTML.
const FRAMEWORK_SIGNALS: &[(&str, &str)] = &[
    ("jquery", "jQuery"),
    ("react-dom", "React"),
    ("data-reactroot", "React"),
    ("vue.min.js", "Vue"),
    ("vue.js", "Vue"),
    ("data-v-app", "Vue"),
    ("ng-app", "Angular"),
    ("angular.min.js", "Angular"),
    ("video.js", "Video.js"),
    ("videojs", "Video.js"),
    ("jwplayer", "JW Player"),
    ("plyr", "Plyr"),
    ("hls.js", "hls.js"),
    ("hls.min.js", "hls.js"),
];

const PLAYER_LIBRARIES: &[&str] = &["Video.js", "JW Player", "Plyr"];

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_quality(text: &str) -> Option<String> {
    QUALITY_RE.captures(text).and_then(|c| c.get(1)).map(|m| {
        let q = m.as_str();
        if q.ends_with(['p', 'P']) && q.len() > 1 {
            q.to_lowercase()
        } else {
            q.to_uppercase()
        }
    })
}

fn parse_provider(text: &str) -> Option<&'static str> {
    PROVIDERS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, name)| *name)
}

fn parse_audio(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if lower.contains("dub") || lower.contains("english") {
        "dub"
    } else {
        DEFAULT_AUDIO
    }
}

fn parse_size(text: &str) -> Option<String> {
    SIZE_RE
        .captures(text)
        .map(|c| format!("{}{}", &c[1], c[2].to_uppercase()))
}

fn parse_format(text: &str, url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    MEDIA_SUFFIXES
        .iter()
        .find(|ext| path.ends_with(&format!(".{}", ext)))
        .map(|ext| ext.to_string())
        .or_else(|| FORMAT_RE.find(text).map(|m| m.as_str().to_lowercase()))
}

fn in_download_section(anchor: &ElementRef<'_>) -> bool {
    anchor.ancestors().filter_map(ElementRef::wrap).any(|el| {
        let el = el.value();
        el.id()
            .is_some_and(|id| id.to_lowercase().contains(DOWNLOAD_SECTION_MARKER))
            || el
                .classes()
                .any(|c| c.to_lowercase().contains(DOWNLOAD_SECTION_MARKER))
    })
}

/// Download links from anchors whose text mentions download, mirror or
/// server, plus every anchor inside a download section (an element whose id
/// or class contains "download", e.g. `#pickDownload`).
pub fn basic_download_links(html: &str) -> Vec<DownloadLink> {
    basic_download_links_with_base(html, None)
}

/// Like [`basic_download_links`], resolving path-relative hrefs against `base`.
pub fn basic_download_links_with_base(html: &str, base: Option<&Url>) -> Vec<DownloadLink> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let text = collapse_whitespace(&anchor.text().collect::<Vec<_>>().join(" "));
        let lower = text.to_lowercase();
        if !DOWNLOAD_WORDS.iter().any(|w| lower.contains(w)) && !in_download_section(&anchor) {
            continue;
        }

        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(url) = normalize_url(href, base) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }

        links.push(DownloadLink {
            provider: parse_provider(&text).unwrap_or(UNKNOWN).to_string(),
            quality: parse_quality(&text).unwrap_or_else(|| UNKNOWN.to_string()),
            audio: parse_audio(&text).to_string(),
            file_size: parse_size(&text),
            format: parse_format(&text, &url),
            url,
        });
    }

    links
}

fn is_streaming_host(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .is_some_and(|host| STREAMING_HOST_WORDS.iter().any(|w| host.contains(w)))
}

/// Iframe sources hosted on known streaming hosts.
pub fn basic_streaming_sources(html: &str) -> Vec<StreamingSource> {
    extract_iframe_candidates(html)
        .into_iter()
        .filter(|c| is_streaming_host(&c.url))
        .map(|c| StreamingSource::iframe(c.url, c.provider))
        .collect()
}

/// Player/download presence plus episode info parsed from `<title>`.
pub fn basic_page_structure(html: &str) -> PageStructure {
    let lower = html.to_lowercase();
    let title = Html::parse_document(html)
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let episode_info = title.map(|t| parse_episode_title(&t)).filter(|i| !i.is_empty());

    PageStructure {
        has_video_player: lower.contains("player") || lower.contains("video"),
        has_download_section: lower.contains("download"),
        episode_info,
    }
}

static EPISODE_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)\bepisode\b", r"(?i)\bep\b\.?", r"-"]
        .into_iter()
        .map(|p| Regex::new(p).expect("episode marker regex should compile"))
        .collect()
});

/// Split a page title into series and episode on the first marker found.
pub fn parse_episode_title(title: &str) -> EpisodeInfo {
    let mut info = EpisodeInfo {
        title: Some(title.to_string()),
        ..Default::default()
    };

    let Some(m) = EPISODE_MARKERS.iter().find_map(|re| re.find(title)) else {
        return info;
    };

    let series = title[..m.start()]
        .trim()
        .trim_end_matches([':', '|', '-', '–'])
        .trim();
    if !series.is_empty() {
        info.series = Some(series.to_string());
    }

    let rest = title[m.end()..].trim();
    info.episode = NUMBER_RE
        .find(rest)
        .map(|n| n.as_str().to_string())
        .or_else(|| {
            let word = rest.split_whitespace().next().unwrap_or("");
            (!word.is_empty()).then(|| word.to_string())
        });

    info
}

/// Framework, cookie and packing signals.
pub fn basic_technical_details(html: &str) -> TechnicalDetails {
    let lower = html.to_lowercase();

    let mut frameworks: Vec<String> = Vec::new();
    for (needle, name) in FRAMEWORK_SIGNALS {
        if lower.contains(needle) && !frameworks.iter().any(|f| f == name) {
            frameworks.push(name.to_string());
        }
    }

    let player_type = PLAYER_LIBRARIES
        .iter()
        .find(|p| frameworks.iter().any(|f| f == *p))
        .map(|p| p.to_string());

    let mut ajax_endpoints: Vec<String> = Vec::new();
    for cap in AJAX_RE.captures_iter(html) {
        let endpoint = cap[1].to_string();
        if !ajax_endpoints.contains(&endpoint) {
            ajax_endpoints.push(endpoint);
        }
        if ajax_endpoints.len() >= 10 {
            break;
        }
    }

    TechnicalDetails {
        frameworks,
        player_type,
        uses_cookies: Some(lower.contains("document.cookie")),
        has_packed_scripts: Some(PACKED_RE.is_match(html)),
        ajax_endpoints,
    }
}

/// Obfuscation patterns recognisable without executing anything.
pub fn basic_obfuscation(html: &str) -> Vec<ObfuscationTechnique> {
    let mut found = Vec::new();
    if PACKED_RE.is_match(html) {
        found.push(ObfuscationTechnique {
            technique: "packed eval".to_string(),
            description: "Dean Edwards style packer: eval(function(p,a,c,k,e,d){...})".to_string(),
            location: Some("inline script".to_string()),
        });
    }
    if html.contains("atob(") {
        found.push(ObfuscationTechnique {
            technique: "base64".to_string(),
            description: "Values decoded at runtime with atob()".to_string(),
            location: Some("inline script".to_string()),
        });
    }
    if html.contains("String.fromCharCode") {
        found.push(ObfuscationTechnique {
            technique: "char codes".to_string(),
            description: "Strings assembled with String.fromCharCode".to_string(),
            location: Some("inline script".to_string()),
        });
    }
    found
}

/// Full heuristic analysis of a page.
pub fn basic_analysis(html: &str, base: Option<&Url>) -> AnalysisResult {
    let download_links = basic_download_links_with_base(html, base);
    let streaming_sources = basic_streaming_sources(html);
    let technical_details = basic_technical_details(html);

    let streaming_logic = format!(
        "Heuristic analysis: {} iframe source(s) on known streaming hosts, {} download link(s){}.",
        streaming_sources.len(),
        download_links.len(),
        if technical_details.has_packed_scripts == Some(true) {
            ", packed JavaScript present"
        } else {
            ""
        }
    );

    AnalysisResult {
        streaming_logic,
        download_links,
        streaming_sources,
        obfuscation_techniques: basic_obfuscation(html),
        page_structure: basic_page_structure(html),
        technical_details,
        extraction_strategy: "Read iframe src attributes for player hosts, then fetch each \
            intermediate host page and scan it for media URLs."
            .to_string(),
    }
}
