// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `taskle`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskle",
    version,
    about = "Incremental task graph scheduling with concurrent evaluation.",
    long_about = None
)]
pub struct CliArgs {
    /// Evaluation mode.
    #[arg(value_enum)]
    pub mode: Mode,

    /// Enable debug-level logging.
    #[arg(long)]
    pub debug: bool,

    /// Number of concurrent workers; defaults to the number of logical
    /// cores minus one.
    #[arg(short = 'w', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Agenda YAML file: procedure, stage and task definitions.
    #[arg(short = 'a', long, value_name = "PATH", default_value = "agenda.yaml")]
    pub agenda: String,

    /// Depend YAML file: implicit file-to-file dependencies. Optional; a
    /// missing file means no implicit edges.
    #[arg(short = 'd', long, value_name = "PATH", default_value = "depend.yaml")]
    pub depend: String,

    /// Binary stat cache carrying change-detection state across runs.
    #[arg(short = 'c', long, value_name = "PATH", default_value = "taskle.cache")]
    pub cache: String,

    /// Log file for runtime messages.
    #[arg(short = 'l', long, value_name = "PATH", default_value = "taskle.log")]
    pub log: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Evaluate stale tasks once and exit at quiescence.
    Offline,
    /// Stay resident: re-evaluate whenever watched files or the agenda or
    /// depend documents change.
    Online,
    /// Remove generated files and the stat cache.
    Clean,
    /// Print the tool version.
    Version,
}
