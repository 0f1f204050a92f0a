//! Spinner-backed progress reporting for interactive runs.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use console::Term;
use streamprobe::progress::{FanoutSink, ProgressEvent, ProgressLevel, ProgressSink, TracingSink};

use super::icons;

/// Shows the latest progress event on a stderr spinner. Warnings and errors
/// are printed above it so they stay visible.
pub struct SpinnerSink {
    bar: ProgressBar,
}

impl SpinnerSink {
    pub fn new(initial: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(initial.to_string());
        Self { bar }
    }

    /// Hidden spinner, used when stderr is not a terminal.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Progress output for one command: a spinner on interactive terminals,
/// log lines through `tracing` otherwise.
pub struct CliProgress {
    spinner: SpinnerSink,
    log: Option<TracingSink>,
}

impl CliProgress {
    pub fn start(message: &str) -> Self {
        Self::with_terminal(message, Term::stderr().is_term())
    }

    fn with_terminal(message: &str, interactive: bool) -> Self {
        if interactive {
            Self {
                spinner: SpinnerSink::new(message),
                log: None,
            }
        } else {
            Self {
                spinner: SpinnerSink::hidden(),
                log: Some(TracingSink),
            }
        }
    }

    pub fn sink(&self) -> FanoutSink<'_> {
        let mut sinks: Vec<&dyn ProgressSink> = vec![&self.spinner];
        if let Some(ref log) = self.log {
            sinks.push(log);
        }
        FanoutSink::new(sinks)
    }

    pub fn finish(&self) {
        self.spinner.finish();
    }
}

impl ProgressSink for SpinnerSink {
    fn emit(&self, event: ProgressEvent) {
        match event.level {
            ProgressLevel::Info => self.bar.set_message(event.to_string()),
            ProgressLevel::Warn => self.bar.println(format!("{} {}", icons::warn(), event)),
            ProgressLevel::Error => self.bar.println(format!("{} {}", icons::error(), event)),
        }
    }
}

impl Drop for SpinnerSink {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_sink_accepts_every_level() {
        let sink = SpinnerSink::hidden();
        sink.emit(ProgressEvent::info("scrape", "Stage: navigating"));
        sink.emit(ProgressEvent::warn("resolve", "retrying"));
        sink.emit(ProgressEvent::error("scrape", "failed"));
        sink.finish();
    }

    #[test]
    fn test_non_interactive_progress_goes_to_log() {
        let progress = CliProgress::with_terminal("Scraping", false);
        assert!(progress.log.is_some());
        progress.sink().emit(ProgressEvent::info("scrape", "Stage: loaded"));
        progress.finish();

        assert!(CliProgress::with_terminal("Scraping", true).log.is_none());
    }
}
