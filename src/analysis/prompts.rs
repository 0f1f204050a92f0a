//! Prompt templates for page analysis. `{content}` is replaced with the
//! preprocessed HTML.

use tracing::warn;

pub const CONTENT_PLACEHOLDER: &str = "{content}";

pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"You are an expert web scraping assistant. Analyze the provided HTML content of an anime episode page. Your goal is to determine how to extract direct streaming and download links.

Based on the HTML, provide:
1. streamingLogic: explain the steps to find the primary video stream URL. Look for iframes, packed/obfuscated JavaScript (like 'eval(function(p,a,c,k,e,d){...})'), or dynamic script tags that load the video player. Describe how to deobfuscate if necessary.
2. downloadLinks: every direct download link. Parse the button text to determine quality, provider and audio type (sub/dub). Use absolute URLs only.
3. streamingSources: each player source with its type (iframe, direct, embedded or ajax). Iframe sources must include iframeUrl.
4. obfuscationTechniques: each obfuscation technique found, with where it appears.
5. pageStructure and technicalDetails: whether a player and a download section exist, episode/series info, frameworks and player libraries, cookie use, packed scripts, ajax endpoints.
6. extractionStrategy: a concrete step-by-step plan for extracting the stream programmatically.

HTML Content:
{content}"#;

pub const DOWNLOAD_LINKS_PROMPT: &str = r#"You are an expert web scraping assistant. Extract every direct download link from the HTML of this anime episode page. For each link parse the button text to determine quality (e.g. 720p), provider (e.g. Kwik) and audio (sub or dub). Use absolute URLs only.

HTML Content:
{content}"#;

/// Fill `template` with `content`. Templates without the placeholder get the
/// content appended so the model always sees the page.
pub fn render_prompt(template: &str, content: &str) -> String {
    if template.contains(CONTENT_PLACEHOLDER) {
        template.replace(CONTENT_PLACEHOLDER, content)
    } else {
        warn!(
            "Analysis prompt has no {} placeholder, appending page content",
            CONTENT_PLACEHOLDER
        );
        format!("{}\n\nHTML Content:\n{}", template.trim_end(), content)
    }
}
