//! `run` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{RunConfig, RunOutcome, SourceConfig};
use pipeline::PipelineController;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::report::RunReport;

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut config = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    apply_overrides(&mut config, args)?;
    ConfigLoader::validate(&config).context("Invalid configuration after CLI overrides")?;

    info!(
        source = %config.source.describe(),
        live = config.is_live(),
        max_in_flight = config.max_in_flight(),
        record_kinds = config.record_kinds.len(),
        sink = config.sink.sink_type.as_str(),
        "configuration loaded"
    );

    if args.dry_run {
        info!("dry run - configuration is valid, exiting");
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::serve_metrics(args.metrics_port)?;
    }

    let sink = insertion::create_sink(&config.sink)
        .await
        .context("Failed to create sink")?;

    let report = RunReport::shared();
    let mut controller =
        PipelineController::new(config).with_event_callback(RunReport::callback(report.clone()));
    controller
        .start_configured(sink)
        .await
        .context("Failed to start pipeline")?;

    let outcome = tokio::select! {
        outcome = controller.wait() => outcome,
        _ = shutdown_signal() => {
            warn!("received shutdown signal, stopping pipeline");
            controller.stop().await
        }
    };

    let snapshot = controller.metrics().snapshot();
    let summary = match report.lock() {
        Ok(mut report) => {
            report.record_future_truncation(snapshot.future_rows_truncated);
            Some(report.summary())
        }
        Err(_) => None,
    };
    if let Some(summary) = summary {
        println!("\n{summary}");
    }

    match outcome.context("Pipeline run failed")? {
        RunOutcome::Completed {
            chunks_inserted,
            rows_inserted,
        } => info!(chunks_inserted, rows_inserted, "source exhausted"),
        RunOutcome::Stopped => info!(
            chunks_decoded = snapshot.chunks_decoded,
            chunks_inserted = snapshot.chunks_inserted,
            "pipeline stopped"
        ),
        RunOutcome::Failed { message } => anyhow::bail!("Pipeline run failed: {message}"),
    }
    Ok(())
}

fn apply_overrides(config: &mut RunConfig, args: &RunArgs) -> Result<()> {
    if let Some(path) = &args.source_path {
        match &mut config.source {
            SourceConfig::File(file) => {
                info!(path = %path.display(), "overriding source path from CLI");
                file.path = path.clone();
            }
            SourceConfig::Live(_) => {
                anyhow::bail!("--source-path only applies to file sources")
            }
        }
    }
    if let Some(threshold) = args.offline_threshold {
        config.backpressure.file_max_in_flight = threshold;
    }
    if let Some(threshold) = args.live_threshold {
        config.backpressure.live_max_in_flight = threshold;
    }
    if args.no_future_check {
        config.postprocess.future_check = false;
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
