//! # Observability
//!
//! Log setup and Prometheus export for trackfeed runs.
//!
//! Logs go through `tracing`; `RUST_LOG` wins over the configured level.
//! Pipeline counters are plain `metrics` calls and cost nothing until an
//! exporter is installed with [`serve_metrics`].
//!
//! ```ignore
//! let config = ObservabilityConfig::for_verbosity(LogFormat::Compact, false, 1);
//! observability::init_with_config(config)?;
//! observability::serve_metrics(9000)?;
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_buffers_dropped, record_chunk_decoded, record_chunk_dropped, record_chunk_inserted,
    record_future_rows_truncated, record_in_flight, record_insert_failure, record_projection,
    record_stage_latency_ms, DropReason, RunMetricsAggregator, RunSummary, RunningStats,
    StatsSummary,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Serve Prometheus metrics on this port
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            level: "info".to_string(),
            metrics_port: None,
        }
    }
}

impl ObservabilityConfig {
    /// Level from `-q` / repeated `-v` flags
    pub fn for_verbosity(log_format: LogFormat, quiet: bool, verbose: u8) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        Self {
            log_format,
            level: level.to_string(),
            metrics_port: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let layer = fmt::layer().with_target(true);
    match format {
        // machine readable: keep the call site for log shipping
        LogFormat::Json => layer
            .json()
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

/// Install the global subscriber and, if a port is set, the exporter.
/// Fails if a subscriber is already installed.
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(config.log_format))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        serve_metrics(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        level = %config.level,
        metrics_port = ?config.metrics_port,
        "logging initialized"
    );
    Ok(())
}

/// Install the Prometheus recorder with an HTTP listener on `port`
pub fn serve_metrics(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to serve Prometheus metrics on port {port}"))?;

    tracing::info!(port, "serving Prometheus metrics");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        let level = |quiet, verbose| {
            ObservabilityConfig::for_verbosity(LogFormat::Json, quiet, verbose).level
        };
        assert_eq!(level(false, 0), "info");
        assert_eq!(level(false, 1), "debug");
        assert_eq!(level(false, 5), "trace");
        assert_eq!(level(true, 3), "warn");
        assert_eq!(ObservabilityConfig::default().metrics_port, None);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
