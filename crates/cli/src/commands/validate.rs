//! `validate` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{RunConfig, SinkType, SourceConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    source: String,
    live: bool,
    max_in_flight: usize,
    record_kinds: usize,
    columns: usize,
    sensors: usize,
    sink: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: Vec::new(),
            summary: None,
        };
    }

    match ConfigLoader::load_from_path(&args.config) {
        Ok(config) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(&config),
            summary: Some(ConfigSummary {
                source: config.source.describe(),
                live: config.is_live(),
                max_in_flight: config.max_in_flight(),
                record_kinds: config.record_kinds.len(),
                columns: config.record_kinds.iter().map(|k| k.columns.len()).sum(),
                sensors: config.sensors.len(),
                sink: config.sink.sink_type.as_str().to_string(),
            }),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

/// Non-fatal issues
fn collect_warnings(config: &RunConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sink.sink_type == SinkType::Log {
        warnings.push("Sink type is 'log' - records are summarized, not stored".to_string());
    }

    for kind in &config.record_kinds {
        if kind.columns.is_empty() {
            warnings.push(format!(
                "Record kind '{}' maps no columns besides rec_num and tod",
                kind.name
            ));
        }
    }

    match &config.source {
        SourceConfig::File(_) if config.postprocess.start_date.is_none() => {
            warnings.push("postprocess.start_date is unset - replay timestamps assume today (UTC)".to_string());
        }
        SourceConfig::Live(_) if !config.postprocess.future_check => {
            warnings.push("postprocess.future_check is off - future records reach the sink".to_string());
        }
        _ => {}
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Source: {}", summary.source);
            println!("  Mode: {}", if summary.live { "live" } else { "file" });
            println!("  Max in-flight chunks: {}", summary.max_in_flight);
            println!("  Record kinds: {}", summary.record_kinds);
            println!("  Mapped columns: {}", summary.columns);
            println!("  Sensor positions: {}", summary.sensors);
            println!("  Sink: {}", summary.sink);
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {warning}");
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {error}");
        }
    }
}
