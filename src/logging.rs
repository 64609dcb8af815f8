// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--debug` CLI flag
//! 2. `TASKLE_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Records go to the log file so that the terminal stays free for task
//! output; if the log file cannot be created we fall back to stderr.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use tracing_subscriber::fmt;

/// Initialise the global logging subscriber. Safe to call once at startup.
pub fn init_logging(debug: bool, log_path: &Path) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        std::env::var("TASKLE_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::INFO)
    };

    match std::fs::File::create(log_path) {
        Ok(file) => {
            fmt()
                .with_max_level(level)
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        Err(err) => {
            eprintln!(
                "taskle: cannot open log file {}: {err}; logging to stderr",
                log_path.display()
            );
            fmt()
                .with_max_level(level)
                .with_target(true)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
