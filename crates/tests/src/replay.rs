//! File replay through the whole pipeline

use std::io::Write;
use std::time::Duration;

use config_loader::{ConfigFormat, ConfigLoader};
use contracts::{columns, RunOutcome};
use insertion::MemorySink;
use pipeline::{PipelineController, PipelineError};
use serde_json::{json, Value};

use crate::fixtures::*;

#[tokio::test]
async fn test_replay_across_midnight() {
    let dir = tempfile::tempdir().unwrap();
    let recording = dir.path().join("replay.jsonl");
    write_jsonl(&recording, &replay_frames());
    let config = load_config(dir.path(), &replay_toml(&recording, ""));

    let (sink, handle) = MemorySink::new("memory");
    let mut controller = PipelineController::new(config);
    controller.start_configured(sink).await.unwrap();
    let outcome = controller.wait().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Completed {
            chunks_inserted: 3,
            rows_inserted: 12
        }
    );
    assert_eq!(handle.seqs(), vec![0, 1, 2]);
    assert!(handle.is_closed());

    let chunks = handle.take();
    assert_eq!(rec_nums(&chunks), (0..12).collect::<Vec<u64>>());

    let plot_ts = collect::<i64>(&chunks, "plot", columns::TIMESTAMP);
    let expected: Vec<i64> = [86_390, 86_392, 86_394, 86_396, 86_398]
        .iter()
        .map(|s| DAY_ONE_MS + s * 1000)
        .chain([1, 3, 5].iter().map(|s| DAY_ONE_MS + DAY_MS + s * 1000))
        .collect();
    assert_eq!(plot_ts, expected);

    let track_ts = collect::<i64>(&chunks, "track", columns::TIMESTAMP);
    assert_eq!(
        track_ts,
        [86_391, 86_393, 86_395, 86_397]
            .iter()
            .map(|s| DAY_ONE_MS + s * 1000)
            .collect::<Vec<_>>()
    );

    let lat = collect::<f64>(&chunks, "plot", columns::LATITUDE);
    let lon = collect::<f64>(&chunks, "plot", columns::LONGITUDE);
    assert_eq!(lat.len(), 8);
    assert!(lat.iter().all(|v| (v - 50.03).abs() < 0.01));
    // due east of the sensor
    assert!(lon.iter().all(|v| *v > 8.57 && *v < 8.7));

    let speed = collect::<f64>(&chunks, "track", columns::GROUND_SPEED);
    let heading = collect::<f64>(&chunks, "track", columns::TRACK_DEG);
    assert_eq!(speed.len(), 4);
    assert!(speed.iter().all(|v| (v - 100.0).abs() < 1e-9));
    assert!(heading.iter().all(|v| (v - 90.0).abs() < 1e-9));
    assert_eq!(collect::<u32>(&chunks, "track", "track_id"), vec![0, 1, 2, 3]);

    let snapshot = controller.metrics().snapshot();
    assert_eq!(snapshot.chunks_decoded, 4);
    assert_eq!(snapshot.empty_chunks, 1);
    assert!(snapshot.peak_in_flight <= 2);
}

#[tokio::test]
async fn test_replay_into_file_sink() {
    let dir = tempfile::tempdir().unwrap();
    let recording = dir.path().join("replay.jsonl");
    let output = dir.path().join("out").join("archive.jsonl");
    write_jsonl(&recording, &replay_frames());
    let sink_section = format!(
        "[sink]\ntype = \"file\"\nname = \"archive\"\nparams = {{ path = \"{}\" }}\n",
        output.display()
    );
    let config = load_config(dir.path(), &replay_toml(&recording, &sink_section));

    let sink = insertion::create_sink(&config.sink).await.unwrap();
    let mut controller = PipelineController::new(config);
    controller.start_configured(sink).await.unwrap();
    controller.wait().await.unwrap();

    let lines: Vec<Value> = std::fs::read_to_string(&output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let heads: Vec<(u64, &str)> = lines
        .iter()
        .map(|line| (line["seq"].as_u64().unwrap(), line["kind"].as_str().unwrap()))
        .collect();
    assert_eq!(
        heads,
        vec![(0, "plot"), (0, "track"), (1, "plot"), (1, "track"), (2, "plot")]
    );

    let rows: usize = lines
        .iter()
        .map(|line| line["rows"].as_array().unwrap().len())
        .sum();
    assert_eq!(rows, 12);

    let first = &lines[0]["rows"][0];
    assert_eq!(first["sensor_id"], json!("psr_north"));
    assert_eq!(first["timestamp"], json!(DAY_ONE_MS + 86_390_000));
    assert!(first["latitude"].is_number());
}

#[tokio::test]
async fn test_malformed_recording_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let recording = dir.path().join("broken.jsonl");
    let mut frames = replay_frames();
    frames.truncate(2);
    write_jsonl(&recording, &frames);
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&recording)
        .unwrap();
    writeln!(file, "{{\"kind\": \"plot\", \"record\":").unwrap();
    let config = load_config(dir.path(), &replay_toml(&recording, ""));

    let (sink, handle) = MemorySink::new("memory");
    let mut controller = PipelineController::new(config);
    controller.start_configured(sink).await.unwrap();
    let err = controller.wait().await.unwrap_err();

    assert!(matches!(err, PipelineError::Decode(_)));
    assert!(handle.is_closed());
    assert_eq!(controller.metrics().in_flight(), 0);
}

#[tokio::test]
async fn test_missing_recording_rejected_at_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(
        dir.path(),
        &replay_toml(&dir.path().join("absent.jsonl"), ""),
    );

    let (sink, _handle) = MemorySink::new("memory");
    let mut controller = PipelineController::new(config);
    let err = controller.start_configured(sink).await.unwrap_err();
    assert!(matches!(err, PipelineError::Decode(_)));
    assert!(!controller.is_running());
}

#[tokio::test]
async fn test_stop_mid_replay() {
    let dir = tempfile::tempdir().unwrap();
    let recording = dir.path().join("long.jsonl");
    let frames: Vec<Value> = (0..400)
        .map(|i| json!({"kind": "track", "record": {"tod": 36_000.0 + i as f64, "vel": {"vx": 1.0, "vy": 1.0}, "id": i}}))
        .collect();
    write_jsonl(&recording, &frames);
    let config = load_config(dir.path(), &replay_toml(&recording, ""));

    let (sink, handle) = MemorySink::new("memory");
    let mut controller = PipelineController::new(config);
    controller
        .start_configured(sink.with_delay(Duration::from_millis(30)))
        .await
        .unwrap();
    assert!(eventually(Duration::from_secs(2), || handle.chunk_count() >= 1).await);

    assert_eq!(controller.stop().await.unwrap(), RunOutcome::Stopped);
    assert!(handle.chunk_count() < 100);
    assert!(handle.is_closed());
    assert_eq!(controller.metrics().in_flight(), 0);

    let seqs = handle.seqs();
    assert_eq!(seqs, (0..seqs.len() as u64).collect::<Vec<_>>());
}

#[test]
fn test_config_survives_toml_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(
        dir.path(),
        &replay_toml(&dir.path().join("replay.jsonl"), ""),
    );

    let toml = ConfigLoader::to_toml(&config).unwrap();
    let reloaded = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
    assert_eq!(reloaded.record_kinds.len(), 2);
    assert_eq!(reloaded.backpressure.file_max_in_flight, 2);
    assert_eq!(reloaded.sensors[0].sensor.as_str(), "psr_north");
}
