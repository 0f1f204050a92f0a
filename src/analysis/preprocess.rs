//! HTML reduction before it is sent to the LLM.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Lines containing any of these are kept first when the page is too large.
const SIGNAL_KEYWORDS: &[&str] = &[
    "player", "video", "download", "stream", "kwik", "episode", "quality",
];

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex should compile"));
static STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>.*?</style>").expect("style regex should compile")
});
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(<script\b[^>]*>)(.*?)(</script>)").expect("script regex should compile")
});
static HSPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\x0c]+").expect("space regex should compile"));
static NEWLINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ?\n[\s]*").expect("newline regex should compile"));

/// Size limits applied during preprocessing (byte lengths, cut on char boundaries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessLimits {
    /// Longest inline script body kept verbatim.
    pub max_script_chars: usize,
    /// Above this size, keyword lines are moved to the front.
    pub keyword_threshold: usize,
    /// Hard cap on the final text.
    pub max_total_chars: usize,
}

impl Default for PreprocessLimits {
    fn default() -> Self {
        Self {
            max_script_chars: 5_000,
            keyword_threshold: 100_000,
            max_total_chars: 80_000,
        }
    }
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
pub fn truncate_at_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Shrink page HTML while keeping the fragments most likely to describe playback.
pub fn preprocess_html(html: &str, limits: &PreprocessLimits) -> String {
    let without_comments = COMMENT_RE.replace_all(html, "");
    let without_styles = STYLE_RE.replace_all(&without_comments, "");

    let scripts_trimmed = SCRIPT_RE.replace_all(&without_styles, |caps: &Captures| {
        let body = &caps[2];
        if body.len() <= limits.max_script_chars {
            return caps[0].to_string();
        }
        let kept = truncate_at_boundary(body, limits.max_script_chars);
        format!(
            "{}{}/* ... truncated {} chars ... */{}",
            &caps[1],
            kept,
            body.len() - kept.len(),
            &caps[3]
        )
    });

    let spaced = HSPACE_RE.replace_all(&scripts_trimmed, " ");
    let collapsed = NEWLINES_RE.replace_all(&spaced, "\n");
    let text = collapsed.trim();

    if text.len() <= limits.keyword_threshold {
        return truncate_at_boundary(text, limits.max_total_chars).to_string();
    }

    let signal_lines: Vec<&str> = text
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            SIGNAL_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .collect();

    let mut out = signal_lines.join("\n");
    out.push_str("\n<!-- remaining content (head) -->\n");
    let room = limits.max_total_chars.saturating_sub(out.len());
    out.push_str(truncate_at_boundary(text, room));

    truncate_at_boundary(&out, limits.max_total_chars).to_string()
}
