//! CLI command definitions and dispatch.

mod analyze;
mod config_cmd;
mod resolve;
mod scrape;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use streamprobe::analysis::PageAnalyzer;
use streamprobe::config::Settings;
use streamprobe::llm::LlmClient;

use super::icons;

#[derive(Parser)]
#[command(name = "streamprobe")]
#[command(about = "Scan episode pages for download links and stream sources")]
#[command(version)]
struct Cli {
    /// Config file path (default: ./streamprobe.toml if present)
    #[arg(short, long, global = true, env = "STREAMPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (before full CLI parsing).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Load a page in the browser, analyze it and resolve intercepted hosts
    Scrape {
        /// Episode page URL
        url: String,

        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
    },

    /// Analyze a saved HTML file without a browser
    Analyze {
        /// HTML file to analyze
        file: PathBuf,

        /// Base URL for resolving relative links
        #[arg(long)]
        base: Option<String>,

        /// Only extract download links
        #[arg(long)]
        links_only: bool,

        /// Skip the LLM and use heuristics only
        #[arg(long)]
        no_ai: bool,

        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
    },

    /// Fetch an intermediate host URL and list the media URLs it exposes
    Resolve {
        /// Intermediate URL, e.g. https://kwik.cx/e/abc
        url: String,

        /// Referer header to send (defaults to the URL itself)
        #[arg(long)]
        referer: Option<String>,

        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
    },

    /// Show the effective configuration with secrets masked
    Config {
        /// Also check whether the configured LLM endpoint answers
        #[arg(long)]
        check: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", icons::error(), e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Scrape { url, pretty } => scrape::cmd_scrape(&settings, &url, pretty).await,
        Commands::Analyze {
            file,
            base,
            links_only,
            no_ai,
            pretty,
        } => {
            analyze::cmd_analyze(
                &settings,
                &file,
                base.as_deref(),
                analyze::AnalyzeMode { links_only, no_ai },
                pretty,
            )
            .await
        }
        Commands::Resolve {
            url,
            referer,
            pretty,
        } => resolve::cmd_resolve(&settings, &url, referer.as_deref(), pretty).await,
        Commands::Config { check } => config_cmd::cmd_config_show(&settings, check).await,
    }
}

/// Analyzer from settings. Falls back to heuristics when the LLM is
/// disabled or `no_ai` is set.
fn build_analyzer(settings: &Settings, no_ai: bool) -> anyhow::Result<PageAnalyzer> {
    let config = settings.scrape.analyzer.clone();
    if no_ai || !settings.llm.enabled {
        return Ok(PageAnalyzer::heuristic_only(config));
    }
    let client = LlmClient::new(settings.llm.clone())?;
    Ok(PageAnalyzer::new(Arc::new(client), config))
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}
