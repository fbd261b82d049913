//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// trackfeed - surveillance record ingestion pipeline
#[derive(Parser, Debug)]
#[command(
    name = "trackfeed",
    author,
    version,
    about = "Surveillance record ingestion pipeline",
    long_about = "Decodes recorded or live surveillance feeds, maps records into typed \n\
                  columnar buffers, reconstructs timestamps and positions, and inserts \n\
                  the result into the configured sink in source order."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TRACKFEED_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TRACKFEED_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline until the source is exhausted or a signal arrives
    Run(RunArgs),

    /// Validate a configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "trackfeed.toml", env = "TRACKFEED_CONFIG")]
    pub config: PathBuf,

    /// Replay this recording instead of the configured file
    #[arg(long, env = "TRACKFEED_SOURCE_PATH")]
    pub source_path: Option<PathBuf>,

    /// Maximum in-flight chunks before a file replay pauses decoding
    #[arg(long, env = "TRACKFEED_OFFLINE_THRESHOLD")]
    pub offline_threshold: Option<usize>,

    /// Maximum in-flight chunks before a live feed drops chunks
    #[arg(long, env = "TRACKFEED_LIVE_THRESHOLD")]
    pub live_threshold: Option<usize>,

    /// Keep records stamped in the future
    #[arg(long)]
    pub no_future_check: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TRACKFEED_METRICS_PORT")]
    pub metrics_port: u16,

    /// Validate configuration and overrides, then exit
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "trackfeed.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "trackfeed.toml")]
    pub config: PathBuf,

    /// Print the normalized configuration as JSON
    #[arg(long)]
    pub json: bool,

    /// Show mapped columns of every record kind
    #[arg(long)]
    pub columns: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
