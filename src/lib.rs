//! streamprobe - episode page probe.
//!
//! Drives a headless browser through an episode page, records requests to
//! intermediate video hosts, extracts download links and stream sources
//! (LLM-assisted, with heuristic fallback) and resolves the captured
//! intermediate URLs to final media URLs.

pub mod analysis;
pub mod browser;
pub mod config;
pub mod extract;
pub mod llm;
pub mod progress;
pub mod resolve;
pub mod retry;
pub mod scrape;
