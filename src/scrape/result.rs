//! Scrape output types.

use serde::{Deserialize, Serialize};

use super::stage::Stage;
use crate::analysis::{AnalysisResult, DownloadLink};
use crate::browser::DomDescriptor;
use crate::resolve::KwikResolution;

/// Page state captured once content has loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    pub html: String,
    /// Final URL after redirects.
    pub url: String,
    pub title: String,
    pub elements: Vec<DomDescriptor>,
}

impl PageSnapshot {
    pub fn info(&self) -> PageInfo {
        PageInfo {
            title: self.title.clone(),
            url: self.url.clone(),
            html_length: self.html.len(),
            elements: self.elements.clone(),
        }
    }
}

/// Snapshot summary included in the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub title: String,
    pub url: String,
    pub html_length: usize,
    pub elements: Vec<DomDescriptor>,
}

/// Intercepted intermediate URLs and what they resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KwikData {
    /// Unique intercepted URLs in first-seen order.
    pub urls: Vec<String>,
    pub sources: Vec<KwikResolution>,
}

/// Stage durations in milliseconds. Stages that never ran stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_extraction_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_ms: Option<u64>,
    pub total_ms: u64,
}

/// Everything one scrape produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    /// Requested URL.
    pub url: String,
    pub analysis: AnalysisResult,
    pub download_links: Vec<DownloadLink>,
    pub kwik: KwikData,
    /// Media-looking URLs seen in page traffic.
    pub candidate_urls: Vec<String>,
    pub page_info: PageInfo,
    pub referrer: String,
    pub timings: Timings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage in which the scrape failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
}

impl ScrapeResult {
    /// Result with an error and empty collections.
    pub fn failed(url: &str, stage: Stage, error: impl Into<String>, timings: Timings) -> Self {
        Self {
            url: url.to_string(),
            timings,
            error: Some(error.into()),
            failed_stage: Some(stage),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Every final media URL found across all resolutions, m3u8 first.
    pub fn media_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = Vec::new();
        for source in &self.kwik.sources {
            let v = &source.video_urls;
            for url in v.m3u8.iter().chain(&v.mp4).chain(&v.webm).chain(&v.mkv) {
                if !urls.contains(&url.as_str()) {
                    urls.push(url);
                }
            }
        }
        urls
    }
}
