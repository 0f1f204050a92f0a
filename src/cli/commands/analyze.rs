//! Offline analysis of saved HTML.

use std::path::Path;

use url::Url;

use streamprobe::config::Settings;

use super::{build_analyzer, print_json};
use crate::cli::progress::CliProgress;

pub struct AnalyzeMode {
    pub links_only: bool,
    pub no_ai: bool,
}

pub async fn cmd_analyze(
    settings: &Settings,
    file: &Path,
    base: Option<&str>,
    mode: AnalyzeMode,
    pretty: bool,
) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let html = tokio::fs::read_to_string(file).await?;
    let base = base
        .map(Url::parse)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid base URL: {}", e))?;

    let analyzer = build_analyzer(settings, mode.no_ai)?;

    if mode.links_only {
        let links = analyzer.download_links_with(&html, base.as_ref()).await;
        return print_json(&links, pretty);
    }

    let progress = CliProgress::start(&format!("Analyzing {}", file.display()));
    let analysis = analyzer
        .analyze_with(&html, base.as_ref(), &progress.sink())
        .await;
    progress.finish();
    print_json(&analysis, pretty)
}
