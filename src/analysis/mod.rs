//! Page analysis: LLM-backed structured extraction with a heuristic fallback.
//!
//! The analyzer never fails. When the model is unavailable or keeps
//! returning malformed output, the heuristic result is returned instead,
//! annotated with why the model path was abandoned.

mod fallback;
mod model;
mod preprocess;
mod prompts;
mod validate;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::llm::{LlmError, OutputSchema, StructuredLlm};
use crate::progress::{NoopSink, ProgressEvent, ProgressSink};
use crate::retry::RetryPolicy;

pub use fallback::{
    basic_analysis, basic_download_links, basic_download_links_with_base, basic_obfuscation,
    basic_page_structure, basic_streaming_sources, basic_technical_details, parse_episode_title,
};
pub use model::{
    AnalysisResult, DownloadLink, EpisodeInfo, ObfuscationTechnique, PageStructure, SourceKind,
    StreamingSource, TechnicalDetails, DEFAULT_AUDIO, UNKNOWN,
};
pub use preprocess::{preprocess_html, truncate_at_boundary, PreprocessLimits};
pub use prompts::{
    render_prompt, CONTENT_PLACEHOLDER, DEFAULT_ANALYSIS_PROMPT, DOWNLOAD_LINKS_PROMPT,
};
pub use validate::{validate_analysis, validate_download_links, ValidationError};

/// Strategy text used whenever the model path was abandoned.
pub const MANUAL_ANALYSIS_REQUIRED: &str = "manual analysis required";

const COMPONENT: &str = "ai";

/// Tuning for [`PageAnalyzer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Model attempts before falling back.
    pub max_attempts: u32,
    /// Linear backoff unit between attempts.
    pub retry_delay_ms: u64,
    pub preprocess: PreprocessLimits,
    /// Replaces the built-in analysis prompt. The page goes where `{content}`
    /// is, or after the prompt when the placeholder is missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1_000,
            preprocess: PreprocessLimits::default(),
            prompt: None,
        }
    }
}

impl AnalyzerConfig {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

/// Output shape for the links-only request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct DownloadLinksOutput {
    download_links: Vec<DownloadLink>,
}

/// Analyzes page HTML into an [`AnalysisResult`].
pub struct PageAnalyzer {
    llm: Option<Arc<dyn StructuredLlm>>,
    config: AnalyzerConfig,
}

impl PageAnalyzer {
    pub fn new(llm: Arc<dyn StructuredLlm>, config: AnalyzerConfig) -> Self {
        Self {
            llm: Some(llm),
            config,
        }
    }

    /// Analyzer that only runs the heuristics.
    pub fn heuristic_only(config: AnalyzerConfig) -> Self {
        Self { llm: None, config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn uses_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn analyze(&self, html: &str) -> AnalysisResult {
        self.analyze_with(html, None, &NoopSink).await
    }

    /// Analyze `html`, resolving relative links against `base`.
    pub async fn analyze_with(
        &self,
        html: &str,
        base: Option<&Url>,
        sink: &dyn ProgressSink,
    ) -> AnalysisResult {
        let Some(llm) = self.llm.as_deref() else {
            debug!("No LLM configured, using heuristic analysis");
            return basic_analysis(html, base);
        };

        let content = preprocess_html(html, &self.config.preprocess);
        let template = self
            .config
            .prompt
            .as_deref()
            .unwrap_or(DEFAULT_ANALYSIS_PROMPT);
        let prompt = render_prompt(template, &content);
        let schema = OutputSchema::for_type::<AnalysisResult>();
        let max = self.config.max_attempts.max(1);

        sink.emit(ProgressEvent::info(
            COMPONENT,
            format!("Analyzing page ({} bytes after preprocessing)", content.len()),
        ));

        let outcome = self
            .config
            .retry_policy()
            .run_if(
                |attempt| {
                    let prompt = &prompt;
                    let schema = &schema;
                    async move {
                        let result = llm
                            .generate(prompt, schema)
                            .await
                            .and_then(|raw| validate_analysis(raw).map_err(LlmError::from));
                        if let Err(ref e) = result {
                            sink.emit(ProgressEvent::warn(
                                COMPONENT,
                                format!("Attempt {}/{} failed: {}", attempt, max, e),
                            ));
                        }
                        result
                    }
                },
                LlmError::is_retryable,
            )
            .await;

        match outcome {
            Ok((ai, attempts)) => {
                info!("LLM analysis succeeded after {} attempt(s)", attempts);
                sink.emit(ProgressEvent::info(
                    COMPONENT,
                    format!(
                        "Analysis complete: {} download link(s), {} source(s)",
                        ai.download_links.len(),
                        ai.streaming_sources.len()
                    ),
                ));
                enhance(ai, basic_analysis(html, base))
            }
            Err(e) => {
                warn!("LLM analysis abandoned: {}", e);
                sink.emit(ProgressEvent::warn(
                    COMPONENT,
                    "Falling back to heuristic analysis",
                ));
                degraded(html, base, &e.last_error, e.attempts)
            }
        }
    }

    pub async fn analyze_download_links_only(&self, html: &str) -> Vec<DownloadLink> {
        self.download_links_with(html, None).await
    }

    /// Single model call for download links only, heuristics on any failure.
    pub async fn download_links_with(&self, html: &str, base: Option<&Url>) -> Vec<DownloadLink> {
        let Some(llm) = self.llm.as_deref() else {
            return basic_download_links_with_base(html, base);
        };

        let content = preprocess_html(html, &self.config.preprocess);
        let prompt = render_prompt(DOWNLOAD_LINKS_PROMPT, &content);
        let schema = OutputSchema::for_type::<DownloadLinksOutput>();

        match llm.generate(&prompt, &schema).await {
            Ok(raw) => match validate_download_links(raw) {
                Ok(links) => links,
                Err(e) => {
                    warn!("Discarding malformed download links: {}", e);
                    basic_download_links_with_base(html, base)
                }
            },
            Err(e) => {
                warn!("Download link extraction failed: {}", e);
                basic_download_links_with_base(html, base)
            }
        }
    }
}

/// Merge heuristic findings into a model result.
fn enhance(mut ai: AnalysisResult, basic: AnalysisResult) -> AnalysisResult {
    let mut seen: HashSet<String> = ai.download_links.iter().map(|l| l.url.clone()).collect();
    for link in basic.download_links {
        if seen.insert(link.url.clone()) {
            ai.download_links.push(link);
        }
    }
    ai.technical_details.fill_gaps_from(&basic.technical_details);
    ai
}

fn degraded(html: &str, base: Option<&Url>, error: &LlmError, attempts: u32) -> AnalysisResult {
    let mut result = basic_analysis(html, base);
    result.streaming_logic = format!(
        "AI analysis failed after {} attempt(s): {}. {}",
        attempts, error, result.streaming_logic
    );
    result.obfuscation_techniques = vec![ObfuscationTechnique {
        technique: "none".to_string(),
        description: "analysis unavailable".to_string(),
        location: None,
    }];
    result.extraction_strategy = MANUAL_ANALYSIS_REQUIRED.to_string();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const PAGE: &str = r#"<html><head><title>Frieren Episode 3</title></head><body>
        <iframe src="https://kwik.cx/e/xyz"></iframe>
        <div class="download">
          <a href="https://dl.test/720">Kwik 720p sub</a>
          <a href="https://dl.test/1080">Kwik 1080p dub</a>
        </div>
        <script src="https://cdn.jwplayer.com/player.js"></script>
    </body></html>"#;

    /// Replays canned responses in order, repeating the last one.
    struct ScriptedLlm {
        responses: Vec<Result<Value, &'static str>>,
        calls: AtomicU32,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<Value, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                responses,
                calls: AtomicU32::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StructuredLlm for ScriptedLlm {
        async fn generate(&self, prompt: &str, _schema: &OutputSchema) -> Result<Value, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.prompts.lock().unwrap().push(prompt.to_string());
            let idx = n.min(self.responses.len() - 1);
            match &self.responses[idx] {
                Ok(v) => Ok(v.clone()),
                Err(msg) => Err(LlmError::Connection(msg.to_string())),
            }
        }
    }

    fn fast_config() -> AnalyzerConfig {
        AnalyzerConfig {
            retry_delay_ms: 0,
            ..Default::default()
        }
    }

    fn ai_result() -> Value {
        json!({
            "streamingLogic": "Player iframe points at kwik",
            "downloadLinks": [
                {"provider": "Kwik", "quality": "720p", "audio": "SUB", "url": "https://dl.test/720"}
            ],
            "streamingSources": [{"type": "iframe", "url": "https://kwik.cx/e/xyz"}],
            "obfuscationTechniques": [],
            "pageStructure": {"hasVideoPlayer": true, "hasDownloadSection": true},
            "technicalDetails": {"frameworks": [], "ajaxEndpoints": []},
            "extractionStrategy": "Follow the iframe"
        })
    }

    #[tokio::test]
    async fn test_heuristic_only_matches_basic_analysis() {
        let analyzer = PageAnalyzer::heuristic_only(fast_config());
        assert!(!analyzer.uses_llm());
        assert_eq!(analyzer.analyze(PAGE).await, basic_analysis(PAGE, None));
    }

    #[tokio::test]
    async fn test_success_is_enhanced_with_heuristics() {
        let llm = ScriptedLlm::new(vec![Ok(ai_result())]);
        let analyzer = PageAnalyzer::new(llm.clone(), fast_config());

        let result = analyzer.analyze(PAGE).await;
        assert_eq!(llm.calls(), 1);
        assert_eq!(result.streaming_logic, "Player iframe points at kwik");

        let urls: Vec<&str> = result.download_links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://dl.test/720", "https://dl.test/1080"]);
        assert_eq!(result.download_links[0].audio, "sub");

        assert_eq!(
            result.streaming_sources[0].iframe_url.as_deref(),
            Some("https://kwik.cx/e/xyz")
        );
        assert_eq!(result.technical_details.player_type.as_deref(), Some("JW Player"));
    }

    #[tokio::test]
    async fn test_prompt_contains_preprocessed_content() {
        let llm = ScriptedLlm::new(vec![Ok(ai_result())]);
        let config = AnalyzerConfig {
            prompt: Some("Custom: {content}".to_string()),
            ..fast_config()
        };
        PageAnalyzer::new(llm.clone(), config).analyze(PAGE).await;

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Custom: "));
        assert!(prompts[0].contains("kwik.cx/e/xyz"));
    }

    #[tokio::test]
    async fn test_prompt_without_placeholder_still_sends_page() {
        let llm = ScriptedLlm::new(vec![Ok(ai_result())]);
        let config = AnalyzerConfig {
            prompt: Some("List the stream sources.".to_string()),
            ..fast_config()
        };
        PageAnalyzer::new(llm.clone(), config).analyze(PAGE).await;

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("List the stream sources."));
        assert!(prompts[0].contains("kwik.cx/e/xyz"));
    }

    #[tokio::test]
    async fn test_retries_until_valid_output() {
        let llm = ScriptedLlm::new(vec![
            Err("connection refused"),
            Ok(json!(["not", "an", "object"])),
            Ok(ai_result()),
        ]);
        let analyzer = PageAnalyzer::new(llm.clone(), fast_config());

        let result = analyzer.analyze(PAGE).await;
        assert_eq!(llm.calls(), 3);
        assert_eq!(result.extraction_strategy, "Follow the iframe");
    }

    #[tokio::test]
    async fn test_exhausted_attempts_degrade_to_heuristics() {
        let llm = ScriptedLlm::new(vec![Err("model offline")]);
        let analyzer = PageAnalyzer::new(llm.clone(), fast_config());

        let result = analyzer.analyze(PAGE).await;
        assert_eq!(llm.calls(), 3);
        assert_eq!(result.download_links, basic_download_links(PAGE));
        assert_eq!(result.extraction_strategy, MANUAL_ANALYSIS_REQUIRED);
        assert!(result.streaming_logic.contains("model offline"));
        assert_eq!(result.obfuscation_techniques.len(), 1);
        assert_eq!(result.obfuscation_techniques[0].description, "analysis unavailable");
    }

    #[tokio::test]
    async fn test_disabled_llm_is_not_retried() {
        struct Off;

        #[async_trait]
        impl StructuredLlm for Off {
            async fn generate(&self, _: &str, _: &OutputSchema) -> Result<Value, LlmError> {
                Err(LlmError::Disabled)
            }
        }

        let analyzer = PageAnalyzer::new(Arc::new(Off), fast_config());
        let result = analyzer.analyze(PAGE).await;
        assert!(result.streaming_logic.contains("after 1 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_linear() {
        let llm = ScriptedLlm::new(vec![Err("busy")]);
        let analyzer = PageAnalyzer::new(llm, AnalyzerConfig::default());

        let start = tokio::time::Instant::now();
        analyzer.analyze(PAGE).await;
        // 1s after the first failure, 2s after the second.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_download_links_only() {
        let llm = ScriptedLlm::new(vec![Ok(json!({
            "downloadLinks": [{"url": "https://dl.test/x", "quality": "480p"}]
        }))]);
        let analyzer = PageAnalyzer::new(llm.clone(), fast_config());
        let links = analyzer.analyze_download_links_only(PAGE).await;
        assert_eq!(llm.calls(), 1);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].provider, "unknown");

        let failing = PageAnalyzer::new(ScriptedLlm::new(vec![Err("down")]), fast_config());
        assert_eq!(
            failing.analyze_download_links_only(PAGE).await,
            basic_download_links(PAGE)
        );
    }
}
