//! Full browser scrape.

use std::sync::Arc;

use streamprobe::browser::ChromeLauncher;
use streamprobe::config::Settings;
use streamprobe::resolve::Resolver;
use streamprobe::scrape::ScrapeController;

use super::{build_analyzer, print_json};
use crate::cli::icons;
use crate::cli::progress::CliProgress;

pub async fn cmd_scrape(settings: &Settings, url: &str, pretty: bool) -> anyhow::Result<()> {
    let analyzer = build_analyzer(settings, false)?;
    let resolver = Resolver::http(settings.scrape.resolver.clone())?;
    let launcher = Arc::new(ChromeLauncher::new(settings.browser.clone()));
    let controller = ScrapeController::new(launcher, analyzer, resolver, settings.scrape.clone());

    let progress = CliProgress::start(&format!("Scraping {}", url));
    let result = controller.scrape_with(url, &progress.sink()).await;
    progress.finish();

    print_json(&result, pretty)?;

    match &result.error {
        None => {
            eprintln!(
                "{} {} download link(s), {} intermediate URL(s), {} media URL(s) in {}ms",
                icons::success(),
                result.download_links.len(),
                result.kwik.urls.len(),
                result.media_urls().len(),
                result.timings.total_ms
            );
            Ok(())
        }
        Some(error) => {
            let stage = result
                .failed_stage
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            eprintln!("{} Scrape failed during {}: {}", icons::error(), stage, error);
            std::process::exit(1);
        }
    }
}
