//! `info` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{RunConfig, SourceConfig};
use tracing::info;

use crate::cli::InfoArgs;

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let json = ConfigLoader::to_json(&config).context("Failed to serialize configuration")?;
        println!("{json}");
    } else {
        print_config_info(&config, args.columns);
    }

    Ok(())
}

fn print_config_info(config: &RunConfig, show_columns: bool) {
    println!("trackfeed configuration\n");

    println!("Source");
    match &config.source {
        SourceConfig::File(file) => {
            println!("   ├─ Recording: {}", file.path.display());
            println!("   ├─ Framing: {:?}", file.framing);
            println!("   └─ Records per chunk: {}", file.records_per_chunk);
        }
        SourceConfig::Live(live) => {
            println!("   ├─ Chunk interval: {} ms", live.chunk_interval_ms);
            println!("   ├─ Max capture lines: {}", live.max_capture_lines);
            println!("   └─ Endpoints ({}):", live.endpoints.len());
            for endpoint in &live.endpoints {
                println!(
                    "        - {} on {} (line {})",
                    endpoint.sensor, endpoint.bind, endpoint.line
                );
            }
        }
    }

    let bp = &config.backpressure;
    println!("\nBackpressure");
    println!("   ├─ File max in-flight: {}", bp.file_max_in_flight);
    println!("   ├─ Live max in-flight: {}", bp.live_max_in_flight);
    println!("   └─ Live stall timeout: {} ms", bp.live_stall_timeout_ms);

    let pp = &config.postprocess;
    println!("\nPost-processing");
    println!("   ├─ Time offset: {} s", pp.time_offset_secs);
    println!(
        "   ├─ Future check: {} (slack {} s)",
        if pp.future_check { "on" } else { "off" },
        pp.future_slack_secs
    );
    println!("   ├─ Midnight vicinity: {} s", pp.midnight_vicinity_secs);
    match pp.start_date {
        Some(date) => println!("   └─ Start date: {date}"),
        None => println!("   └─ Start date: today (UTC)"),
    }

    println!("\nRecord kinds ({})", config.record_kinds.len());
    for kind in &config.record_kinds {
        println!(
            "   - {} (tod: {}, sensor: {}, {} columns)",
            kind.name,
            kind.tod_path,
            kind.sensor_path.as_deref().unwrap_or("-"),
            kind.columns.len()
        );
        if show_columns {
            for column in &kind.columns {
                println!(
                    "        {} <- {} ({})",
                    column.column,
                    column.path,
                    column.kind.as_str()
                );
            }
        }
    }

    if !config.sensors.is_empty() {
        println!("\nSensor positions ({})", config.sensors.len());
        for sensor in &config.sensors {
            println!(
                "   - {}: {:.5}, {:.5}, {} m",
                sensor.sensor, sensor.latitude, sensor.longitude, sensor.altitude_m
            );
        }
    }

    println!("\nSink");
    println!("   ├─ Type: {}", config.sink.sink_type.as_str());
    println!(
        "   └─ Name: {}",
        config
            .sink
            .name
            .as_deref()
            .unwrap_or(config.sink.sink_type.as_str())
    );
    println!();
}
