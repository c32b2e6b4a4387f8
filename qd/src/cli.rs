//! Command-line interface definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Durable single-flight work-queue daemon
#[derive(Debug, Parser)]
#[command(name = "qd", version, about)]
pub struct Cli {
    /// Path to configuration file (default: .queued.yml, then
    /// ~/.config/queued/queued.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE/DEBUG/INFO/WARN/ERROR)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler loop in the foreground until interrupted
    Run,

    /// Refresh the cache and rebuild the queue once, without processing
    Refresh,

    /// Show durable state counters and the last-action timestamp
    Status {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Output format for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
