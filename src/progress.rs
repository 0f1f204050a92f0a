//! Human-readable progress reporting.
//!
//! The pipeline reports notable steps (stage entry, retries, failures) to a
//! [`ProgressSink`]. Sinks are fire-and-forget: `emit` returns nothing, must
//! not block, and whatever happens inside it cannot change pipeline state.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLevel {
    Info,
    Warn,
    Error,
}

/// One progress message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub level: ProgressLevel,
    /// Pipeline component that emitted the event, e.g. "browser" or "ai".
    pub component: &'static str,
    pub message: String,
}

impl ProgressEvent {
    pub fn info(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Info,
            component,
            message: message.into(),
        }
    }

    pub fn warn(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Warn,
            component,
            message: message.into(),
        }
    }

    pub fn error(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Error,
            component,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.component, self.message)
    }
}

/// Observer for pipeline progress.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        match event.level {
            ProgressLevel::Info => info!(component = event.component, "{}", event.message),
            ProgressLevel::Warn => warn!(component = event.component, "{}", event.message),
            ProgressLevel::Error => error!(component = event.component, "{}", event.message),
        }
    }
}

/// Pushes events into a bounded channel, dropping them when it is full or closed.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.try_send(event);
    }
}

/// Sends each event to several sinks.
pub struct FanoutSink<'a> {
    sinks: Vec<&'a dyn ProgressSink>,
}

impl<'a> FanoutSink<'a> {
    pub fn new(sinks: Vec<&'a dyn ProgressSink>) -> Self {
        Self { sinks }
    }
}

impl ProgressSink for FanoutSink<'_> {
    fn emit(&self, event: ProgressEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
