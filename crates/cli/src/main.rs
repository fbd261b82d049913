//! # trackfeed CLI
//!
//! Entry point of the `trackfeed` binary:
//! - configuration loading and validation
//! - pipeline runs with graceful shutdown
//! - end-of-run summary

mod cli;
mod commands;
mod report;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "trackfeed starting");

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "command failed");
    }

    result
}

fn init_logging(cli: &Cli) -> Result<()> {
    observability::init_with_config(ObservabilityConfig::for_verbosity(
        cli.log_format.into(),
        cli.quiet,
        cli.verbose,
    ))
}
