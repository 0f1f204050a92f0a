//! Conforming raw LLM output to the analysis types.
//!
//! Models drift from the declared schema: snake_case keys, missing optional
//! fields, relative URLs, obfuscation findings as bare strings. Everything
//! that can be repaired is repaired here; anything else is a
//! [`ValidationError`] and counts as a failed attempt.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::model::{
    AnalysisResult, DownloadLink, ObfuscationTechnique, PageStructure, SourceKind,
    StreamingSource, TechnicalDetails, DEFAULT_AUDIO, UNKNOWN,
};
use crate::extract::normalize_url;

/// Why a raw object could not be turned into an [`AnalysisResult`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Response does not match schema: {0}")]
    Shape(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    #[serde(alias = "streaming_logic")]
    streaming_logic: String,
    #[serde(alias = "download_links")]
    download_links: Vec<RawDownloadLink>,
    #[serde(default, alias = "streaming_sources")]
    streaming_sources: Vec<RawStreamingSource>,
    #[serde(default, alias = "obfuscation_techniques")]
    obfuscation_techniques: Vec<RawObfuscation>,
    #[serde(default, alias = "page_structure")]
    page_structure: Option<PageStructure>,
    #[serde(default, alias = "technical_details")]
    technical_details: Option<TechnicalDetails>,
    #[serde(default, alias = "extraction_strategy")]
    extraction_strategy: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLinksOnly {
    #[serde(alias = "download_links")]
    download_links: Vec<RawDownloadLink>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawDownloadLink {
    provider: Option<String>,
    quality: Option<String>,
    audio: Option<String>,
    url: Option<String>,
    #[serde(alias = "file_size", alias = "size")]
    file_size: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawStreamingSource {
    #[serde(rename = "type", alias = "kind")]
    kind: Option<String>,
    url: Option<String>,
    #[serde(alias = "iframe_url")]
    iframe_url: Option<String>,
    quality: Option<String>,
    provider: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawObfuscation {
    Text(String),
    Detailed {
        #[serde(alias = "name")]
        technique: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        location: Option<String>,
    },
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Validate and conform a raw analysis object.
pub fn validate_analysis(raw: Value) -> Result<AnalysisResult, ValidationError> {
    if !raw.is_object() {
        return Err(ValidationError::NotAnObject(kind_name(&raw)));
    }

    let parsed: RawAnalysis =
        serde_json::from_value(raw).map_err(|e| ValidationError::Shape(e.to_string()))?;

    Ok(AnalysisResult {
        streaming_logic: parsed.streaming_logic.trim().to_string(),
        download_links: conform_links(parsed.download_links),
        streaming_sources: parsed
            .streaming_sources
            .into_iter()
            .filter_map(conform_source)
            .collect(),
        obfuscation_techniques: parsed
            .obfuscation_techniques
            .into_iter()
            .map(conform_obfuscation)
            .collect(),
        page_structure: parsed.page_structure.unwrap_or_default(),
        technical_details: parsed.technical_details.unwrap_or_default(),
        extraction_strategy: parsed.extraction_strategy.unwrap_or_default(),
    })
}

/// Validate a `{ "downloadLinks": [...] }` object, or a bare array of links.
pub fn validate_download_links(raw: Value) -> Result<Vec<DownloadLink>, ValidationError> {
    let links: Vec<RawDownloadLink> = match raw {
        Value::Array(_) => {
            serde_json::from_value(raw).map_err(|e| ValidationError::Shape(e.to_string()))?
        }
        Value::Object(_) => {
            serde_json::from_value::<RawLinksOnly>(raw)
                .map_err(|e| ValidationError::Shape(e.to_string()))?
                .download_links
        }
        other => return Err(ValidationError::NotAnObject(kind_name(&other))),
    };
    Ok(conform_links(links))
}

fn non_empty(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn conform_links(raw: Vec<RawDownloadLink>) -> Vec<DownloadLink> {
    raw.into_iter()
        .filter_map(|link| {
            let url = normalize_url(link.url.as_deref()?, None)?;
            let audio = non_empty(link.audio, DEFAULT_AUDIO).to_lowercase();
            Some(DownloadLink {
                provider: non_empty(link.provider, UNKNOWN),
                quality: non_empty(link.quality, UNKNOWN),
                audio,
                url,
                file_size: link.file_size.filter(|s| !s.trim().is_empty()),
                format: link.format.filter(|s| !s.trim().is_empty()),
            })
        })
        .collect()
}

fn conform_source(raw: RawStreamingSource) -> Option<StreamingSource> {
    let url = raw.url.as_deref().and_then(|u| normalize_url(u, None));
    let mut iframe_url = raw.iframe_url.as_deref().and_then(|u| normalize_url(u, None));

    let kind = match raw.kind.as_deref().and_then(SourceKind::parse) {
        Some(kind) => kind,
        None if iframe_url.is_some() => SourceKind::Iframe,
        None if url.is_some() => SourceKind::Direct,
        None => return None,
    };

    if kind == SourceKind::Iframe && iframe_url.is_none() {
        // Models often put the iframe address under `url`.
        iframe_url = Some(url.clone()?);
    }

    Some(StreamingSource {
        kind,
        url,
        iframe_url,
        quality: raw.quality.filter(|s| !s.is_empty()),
        provider: raw.provider.filter(|s| !s.is_empty()),
    })
}

fn conform_obfuscation(raw: RawObfuscation) -> ObfuscationTechnique {
    match raw {
        RawObfuscation::Text(text) => ObfuscationTechnique {
            technique: text.clone(),
            description: text,
            location: None,
        },
        RawObfuscation::Detailed {
            technique,
            description,
            location,
        } => ObfuscationTechnique {
            technique,
            description,
            location,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_minimal_object() {
        let result = validate_analysis(json!({
            "streamingLogic": "  iframe to kwik  ",
            "downloadLinks": [
                {"provider": "Kwik", "quality": "1080p", "audio": "SUB", "url": "https://kwik.cx/f/a"}
            ]
        }))
        .unwrap();
        assert_eq!(result.streaming_logic, "iframe to kwik");
        assert_eq!(result.download_links.len(), 1);
        assert_eq!(result.download_links[0].audio, "sub");
        assert!(result.streaming_sources.is_empty());
        assert_eq!(result.extraction_strategy, "");
    }

    #[test]
    fn test_validate_accepts_snake_case_and_fills_defaults() {
        let result = validate_analysis(json!({
            "streaming_logic": "x",
            "download_links": [
                {"url": "//cdn.test/file", "provider": ""},
                {"url": "not a url"},
                {"quality": "720p"}
            ],
            "obfuscation_techniques": ["base64", {"name": "packed eval", "location": "inline"}],
            "page_structure": {"has_video_player": true}
        }))
        .unwrap();

        assert_eq!(result.download_links.len(), 1);
        let link = &result.download_links[0];
        assert_eq!(link.url, "https://cdn.test/file");
        assert_eq!(link.provider, "unknown");
        assert_eq!(link.quality, "unknown");
        assert_eq!(link.audio, "sub");

        assert_eq!(result.obfuscation_techniques.len(), 2);
        assert_eq!(result.obfuscation_techniques[0].technique, "base64");
        assert_eq!(result.obfuscation_techniques[1].technique, "packed eval");
        assert_eq!(
            result.obfuscation_techniques[1].location.as_deref(),
            Some("inline")
        );
        assert!(result.page_structure.has_video_player);
    }

    #[test]
    fn test_iframe_source_always_has_iframe_url() {
        let result = validate_analysis(json!({
            "streamingLogic": "",
            "downloadLinks": [],
            "streamingSources": [
                {"type": "iframe", "url": "https://kwik.cx/e/1"},
                {"type": "iframe"},
                {"iframeUrl": "https://player.test/e/2"},
                {"url": "https://cdn.test/v.mp4"},
                {}
            ]
        }))
        .unwrap();

        let sources = result.streaming_sources;
        assert_eq!(sources.len(), 3);
        for src in sources.iter().filter(|s| s.kind == SourceKind::Iframe) {
            assert!(src.iframe_url.is_some());
        }
        assert_eq!(sources[0].iframe_url.as_deref(), Some("https://kwik.cx/e/1"));
        assert_eq!(sources[1].kind, SourceKind::Iframe);
        assert_eq!(sources[2].kind, SourceKind::Direct);
    }

    #[test]
    fn test_validate_rejects_wrong_shapes() {
        assert_eq!(
            validate_analysis(json!("just text")),
            Err(ValidationError::NotAnObject("a string"))
        );
        assert!(matches!(
            validate_analysis(json!({"downloadLinks": []})),
            Err(ValidationError::Shape(_))
        ));
        assert!(matches!(
            validate_analysis(json!({"streamingLogic": "x", "downloadLinks": "none"})),
            Err(ValidationError::Shape(_))
        ));
    }

    #[test]
    fn test_validate_download_links_variants() {
        let from_obj = validate_download_links(json!({
            "downloadLinks": [{"url": "https://a.test/1", "provider": "WAP"}]
        }))
        .unwrap();
        assert_eq!(from_obj[0].provider, "WAP");

        let from_arr = validate_download_links(json!([{"url": "https://a.test/2"}])).unwrap();
        assert_eq!(from_arr[0].url, "https://a.test/2");

        assert!(validate_download_links(json!(42)).is_err());
    }
}
