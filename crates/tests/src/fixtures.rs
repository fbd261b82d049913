//! Shared helpers

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use columnar::Scalar;
use contracts::{columns, Chunk, RecordBuffer, RunConfig};
use serde_json::{json, Value};

/// Midnight of the replay start date, ms since epoch
pub const DAY_ONE_MS: i64 = 1_717_200_000_000;

pub const DAY_MS: i64 = 86_400_000;

/// Replay straddling midnight: plots every 2 s from 23:59:50 to 00:00:05,
/// tracks in between until 23:59:57
pub fn replay_frames() -> Vec<Value> {
    let mut frames = Vec::new();
    for (i, tod) in [86_390.0, 86_392.0, 86_394.0, 86_396.0].into_iter().enumerate() {
        frames.push(plot(tod, 1_000.0 + i as f64));
        frames.push(json!({
            "kind": "track",
            "record": {"tod": tod + 1.0, "vel": {"vx": 100.0, "vy": 0.0}, "id": i}
        }));
    }
    for (i, tod) in [86_398.0, 1.0, 3.0, 5.0].into_iter().enumerate() {
        frames.push(plot(tod, 2_000.0 + i as f64));
    }
    frames
}

fn plot(tod: f64, range: f64) -> Value {
    json!({
        "kind": "plot",
        "record": {"tod": tod, "sensor": "psr_north", "rho": range, "theta": 90.0}
    })
}

pub fn write_jsonl(path: &Path, frames: &[Value]) {
    let mut file = std::fs::File::create(path).unwrap();
    for frame in frames {
        writeln!(file, "{frame}").unwrap();
    }
}

/// Replay configuration as TOML; `sink` is appended verbatim
pub fn replay_toml(recording: &Path, sink: &str) -> String {
    format!(
        r#"
[source]
type = "file"
path = "{}"
records_per_chunk = 4

[backpressure]
file_max_in_flight = 2

[postprocess]
start_date = "2024-06-01"

[[record_kinds]]
name = "plot"
tod_path = "tod"
sensor_path = "sensor"
columns = [
    {{ path = "rho", column = "range_m", kind = "f64" }},
    {{ path = "theta", column = "bearing_deg", kind = "f64" }},
]

[[record_kinds]]
name = "track"
tod_path = "tod"
columns = [
    {{ path = "vel.vx", column = "vx", kind = "f64" }},
    {{ path = "vel.vy", column = "vy", kind = "f64" }},
    {{ path = "id", column = "track_id", kind = "u32" }},
]

[[sensors]]
sensor = "psr_north"
latitude = 50.03
longitude = 8.57
altitude_m = 100.0

{sink}
"#,
        recording.display()
    )
}

pub fn load_config(dir: &Path, toml: &str) -> RunConfig {
    let path = dir.join("run.toml");
    std::fs::write(&path, toml).unwrap();
    config_loader::ConfigLoader::load_from_path(&path).unwrap()
}

/// Valid cells of one column across every chunk of `kind`, in insertion order
pub fn collect<T: Scalar>(
    chunks: &[Chunk],
    kind: &str,
    column: &str,
) -> Vec<T> {
    chunks
        .iter()
        .filter_map(|chunk| chunk.buffers.get(kind))
        .flat_map(|buffer| cells::<T>(buffer, column))
        .collect()
}

fn cells<T: Scalar>(buffer: &RecordBuffer, column: &str) -> Vec<T> {
    let typed = buffer.column_ref::<T>(column);
    (0..buffer.row_count())
        .filter_map(|row| typed.get(row).cloned())
        .collect()
}

pub fn rec_nums(chunks: &[Chunk]) -> Vec<u64> {
    let mut all: Vec<u64> = ["plot", "track"]
        .iter()
        .flat_map(|kind| collect::<u64>(chunks, kind, columns::REC_NUM))
        .collect();
    all.sort_unstable();
    all
}

/// Poll `done` until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    done()
}
