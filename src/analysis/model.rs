//! Structured page analysis types.
//!
//! These are both the declared LLM output schema and the shape the fallback
//! analyzer produces, so the two paths are interchangeable downstream.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const UNKNOWN: &str = "unknown";
pub const DEFAULT_AUDIO: &str = "sub";

/// A direct download link found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    /// The name of the download provider, e.g. "WAP" or "Yameii".
    pub provider: String,
    /// The quality of the download, e.g. "720p" or "1080p".
    pub quality: String,
    /// The audio language, "sub" or "dub".
    pub audio: String,
    /// The absolute download URL.
    pub url: String,
    /// Human readable file size when the page states one, e.g. "212MB".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<String>,
    /// Container format when known, e.g. "mp4".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl DownloadLink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            provider: UNKNOWN.to_string(),
            quality: UNKNOWN.to_string(),
            audio: DEFAULT_AUDIO.to_string(),
            url: url.into(),
            file_size: None,
            format: None,
        }
    }
}

/// How a streaming source is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Iframe,
    Direct,
    Embedded,
    Ajax,
}

impl SourceKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "iframe" => Some(Self::Iframe),
            "direct" => Some(Self::Direct),
            "embedded" | "embed" => Some(Self::Embedded),
            "ajax" | "xhr" | "api" => Some(Self::Ajax),
            _ => None,
        }
    }
}

/// A streaming source. `iframe_url` is always set when `kind` is `Iframe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamingSource {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl StreamingSource {
    pub fn iframe(iframe_url: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Iframe,
            url: None,
            iframe_url: Some(iframe_url.into()),
            quality: None,
            provider: Some(provider.into()),
        }
    }
}

/// An obfuscation technique observed in page scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObfuscationTechnique {
    /// Short name, e.g. "packed eval" or "base64".
    pub technique: String,
    pub description: String,
    /// Where it was seen (script src, inline block, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
}

impl EpisodeInfo {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.episode.is_none() && self.series.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PageStructure {
    #[serde(alias = "has_video_player")]
    pub has_video_player: bool,
    #[serde(alias = "has_download_section")]
    pub has_download_section: bool,
    #[serde(alias = "episode_info", skip_serializing_if = "Option::is_none")]
    pub episode_info: Option<EpisodeInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct TechnicalDetails {
    /// Frontend frameworks and player libraries detected.
    pub frameworks: Vec<String>,
    /// Player implementation, e.g. "Plyr" or "JW Player".
    #[serde(alias = "player_type", skip_serializing_if = "Option::is_none")]
    pub player_type: Option<String>,
    /// Whether scripts set cookies the stream depends on.
    #[serde(alias = "uses_cookies", skip_serializing_if = "Option::is_none")]
    pub uses_cookies: Option<bool>,
    /// Whether packed `eval(function(p,a,c,k,e,d)` code is present.
    #[serde(alias = "has_packed_scripts", skip_serializing_if = "Option::is_none")]
    pub has_packed_scripts: Option<bool>,
    /// XHR/fetch endpoints that return source data.
    #[serde(alias = "ajax_endpoints")]
    pub ajax_endpoints: Vec<String>,
}

impl TechnicalDetails {
    /// Fill fields left unset here from `other`. Set fields are never overwritten.
    pub fn fill_gaps_from(&mut self, other: &TechnicalDetails) {
        if self.frameworks.is_empty() {
            self.frameworks = other.frameworks.clone();
        }
        if self.player_type.is_none() {
            self.player_type = other.player_type.clone();
        }
        if self.uses_cookies.is_none() {
            self.uses_cookies = other.uses_cookies;
        }
        if self.has_packed_scripts.is_none() {
            self.has_packed_scripts = other.has_packed_scripts;
        }
        if self.ajax_endpoints.is_empty() {
            self.ajax_endpoints = other.ajax_endpoints.clone();
        }
    }
}

/// Structured output of the analysis stage (AI or fallback).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// How the streaming URLs are generated or found on the page, including
    /// obfuscation such as base64, eval() or dynamic script loading.
    pub streaming_logic: String,
    /// All download links found on the page.
    pub download_links: Vec<DownloadLink>,
    /// Streaming sources (iframes, direct files, embedded players, ajax).
    #[serde(default)]
    pub streaming_sources: Vec<StreamingSource>,
    #[serde(default)]
    pub obfuscation_techniques: Vec<ObfuscationTechnique>,
    #[serde(default)]
    pub page_structure: PageStructure,
    #[serde(default)]
    pub technical_details: TechnicalDetails,
    /// Step-by-step plan for extracting the stream programmatically.
    #[serde(default)]
    pub extraction_strategy: String,
}
