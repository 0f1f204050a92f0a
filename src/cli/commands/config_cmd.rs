//! Configuration display.

use streamprobe::config::Settings;
use streamprobe::llm::LlmClient;

use crate::cli::icons;

pub async fn cmd_config_show(settings: &Settings, check: bool) -> anyhow::Result<()> {
    match &settings.source_path {
        Some(path) => eprintln!("{} Loaded from {}", icons::dim_arrow(), path.display()),
        None => eprintln!("{} No config file, showing defaults", icons::dim_arrow()),
    }
    print!("{}", settings.to_toml_redacted()?);

    if check {
        check_llm(settings).await?;
    }
    Ok(())
}

async fn check_llm(settings: &Settings) -> anyhow::Result<()> {
    let llm = &settings.llm;
    if !llm.enabled {
        eprintln!("{} LLM disabled, analysis uses heuristics only", icons::warn());
        return Ok(());
    }

    let client = LlmClient::new(llm.clone())?;
    if client.is_available().await {
        eprintln!(
            "{} LLM reachable at {} (model {})",
            icons::success(),
            llm.endpoint,
            llm.model
        );
    } else {
        eprintln!(
            "{} LLM not reachable at {}; scrapes will fall back to heuristics",
            icons::error(),
            llm.endpoint
        );
    }
    Ok(())
}
