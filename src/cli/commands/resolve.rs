//! Single intermediate URL resolution.

use streamprobe::config::Settings;
use streamprobe::resolve::{ResolveTarget, Resolver};

use super::print_json;
use crate::cli::icons;

pub async fn cmd_resolve(
    settings: &Settings,
    url: &str,
    referer: Option<&str>,
    pretty: bool,
) -> anyhow::Result<()> {
    let resolver = Resolver::http(settings.scrape.resolver.clone())?;
    let target = ResolveTarget {
        url: url.to_string(),
        referrer: referer.unwrap_or(url).to_string(),
    };

    let resolution = resolver.resolve_one(&target).await;
    print_json(&resolution, pretty)?;

    if !resolution.success {
        eprintln!(
            "{} Failed after {} attempt(s): {}",
            icons::error(),
            resolution.attempts_used,
            resolution.error.as_deref().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }
    if resolution.video_urls.total() == 0 {
        eprintln!("{} Page fetched but no media URLs found", icons::warn());
    }
    Ok(())
}
