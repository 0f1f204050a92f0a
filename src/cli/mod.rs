//! Command-line interface for streamprobe.

mod commands;
pub mod icons;
pub mod progress;

pub use commands::{is_verbose, run};
