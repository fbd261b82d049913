//! RunConfig - Config Loader output
//!
//! Describes one pipeline run: where records come from, how they are mapped
//! into columns, post-processing tuning, overload thresholds and the sink.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::NaiveDate;
use columnar::DataKind;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::SensorId;

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunConfig {
    /// Record source
    pub source: SourceConfig,

    /// Overload thresholds
    #[serde(default)]
    #[validate(nested)]
    pub backpressure: BackpressureConfig,

    /// Post-processing tuning
    #[serde(default)]
    #[validate(nested)]
    pub postprocess: PostprocessConfig,

    /// Mapping schema, one entry per record kind
    #[serde(default)]
    pub record_kinds: Vec<RecordKindConfig>,

    /// Sensor reference positions used for projection
    #[serde(default)]
    pub sensors: Vec<SensorPosition>,

    /// Output sink
    #[serde(default)]
    pub sink: SinkConfig,

    /// Assert column bounds after every buffer mutation.
    /// Defaults to on in debug builds.
    #[serde(default)]
    pub strict_buffers: Option<bool>,
}

impl RunConfig {
    pub fn is_live(&self) -> bool {
        matches!(self.source, SourceConfig::Live(_))
    }

    /// In-flight bound for the configured source mode
    pub fn max_in_flight(&self) -> usize {
        if self.is_live() {
            self.backpressure.live_max_in_flight
        } else {
            self.backpressure.file_max_in_flight
        }
    }

    pub fn strict_buffers(&self) -> bool {
        self.strict_buffers.unwrap_or(cfg!(debug_assertions))
    }

    pub fn record_kind(&self, name: &str) -> Option<&RecordKindConfig> {
        self.record_kinds.iter().find(|kind| kind.name == name)
    }
}

// ===== Source =====

/// Record source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Replay a recorded file
    File(FileSourceConfig),
    /// Capture live network feeds
    Live(LiveSourceConfig),
}

impl SourceConfig {
    /// Short description for logs and events
    pub fn describe(&self) -> String {
        match self {
            SourceConfig::File(file) => format!("file:{}", file.path.display()),
            SourceConfig::Live(live) => format!("live:{} endpoints", live.endpoints.len()),
        }
    }
}

/// File replay source
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FileSourceConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub framing: Framing,

    /// Records per decoded chunk
    #[serde(default = "default_records_per_chunk")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub records_per_chunk: usize,
}

fn default_records_per_chunk() -> usize {
    1000
}

/// File framing mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One JSON object per line
    #[default]
    JsonLines,
    /// 4-byte big-endian length followed by one JSON object
    LengthPrefixed,
}

/// Live network source
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LiveSourceConfig {
    #[validate(length(min = 1))]
    pub endpoints: Vec<LiveEndpoint>,

    /// Period between emitted chunks
    #[serde(default = "default_chunk_interval_ms")]
    #[validate(range(min = 10, max = 60_000))]
    pub chunk_interval_ms: u64,

    /// Maximum number of distinct capture lines
    #[serde(default = "default_max_capture_lines")]
    #[validate(range(min = 1, max = 16))]
    pub max_capture_lines: usize,

    /// Largest accepted datagram
    #[serde(default = "default_max_datagram_bytes")]
    #[validate(range(min = 512, max = 65_535))]
    pub max_datagram_bytes: usize,
}

fn default_chunk_interval_ms() -> u64 {
    500
}

fn default_max_capture_lines() -> usize {
    4
}

fn default_max_datagram_bytes() -> usize {
    65_535
}

/// One live feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveEndpoint {
    pub sensor: SensorId,
    pub bind: SocketAddr,
    /// Redundant capture line the feed arrives on
    #[serde(default = "default_line")]
    pub line: u8,
}

fn default_line() -> u8 {
    1
}

// ===== Backpressure =====

/// Overload thresholds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BackpressureConfig {
    /// File mode: pause the decoder above this many in-flight chunks
    #[serde(default = "default_file_max_in_flight")]
    #[validate(range(min = 1, max = 1024))]
    pub file_max_in_flight: usize,

    /// Live mode: drop decoded chunks above this many in-flight chunks
    #[serde(default = "default_live_max_in_flight")]
    #[validate(range(min = 1, max = 1024))]
    pub live_max_in_flight: usize,

    /// Live mode: drain one queued insert after staying overloaded this long
    #[serde(default = "default_live_stall_timeout_ms")]
    #[validate(range(min = 100))]
    pub live_stall_timeout_ms: u64,
}

fn default_file_max_in_flight() -> usize {
    4
}

fn default_live_max_in_flight() -> usize {
    2
}

fn default_live_stall_timeout_ms() -> u64 {
    5000
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            file_max_in_flight: default_file_max_in_flight(),
            live_max_in_flight: default_live_max_in_flight(),
            live_stall_timeout_ms: default_live_stall_timeout_ms(),
        }
    }
}

// ===== Post-processing =====

/// Post-processing tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PostprocessConfig {
    /// Signed seconds added to every time-of-day value
    #[serde(default)]
    #[validate(range(min = -86_400.0, max = 86_400.0))]
    pub time_offset_secs: f64,

    /// Reject records from the future (live mode only)
    #[serde(default = "default_true")]
    pub future_check: bool,

    /// Tolerated lead of record time over wall-clock time
    #[serde(default = "default_future_slack_secs")]
    #[validate(range(min = 0.0, max = 3_600.0))]
    pub future_slack_secs: f64,

    /// Distance from midnight within which rollover logic applies
    #[serde(default = "default_midnight_vicinity_secs")]
    #[validate(range(min = 1.0, max = 43_199.0))]
    pub midnight_vicinity_secs: f64,

    /// Date of the first record of a replay (defaults to today, UTC)
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

fn default_true() -> bool {
    true
}

fn default_future_slack_secs() -> f64 {
    180.0
}

fn default_midnight_vicinity_secs() -> f64 {
    300.0
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            time_offset_secs: 0.0,
            future_check: true,
            future_slack_secs: default_future_slack_secs(),
            midnight_vicinity_secs: default_midnight_vicinity_secs(),
            start_date: None,
        }
    }
}

// ===== Mapping schema =====

/// Mapping schema for one record kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordKindConfig {
    /// Kind name as tagged by the decoder
    pub name: String,

    /// Field path of the time-of-day seconds
    pub tod_path: String,

    /// Field path of the originating sensor (live decoders inject `sensor_id`)
    #[serde(default)]
    pub sensor_path: Option<String>,

    /// Mapped columns
    #[serde(default)]
    pub columns: Vec<ColumnMapping>,
}

/// One field path mapped to one typed column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Dot-separated field path, numeric segments index arrays
    pub path: String,
    pub column: String,
    pub kind: DataKind,
}

// ===== Projection =====

/// Reference position of a sensor
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorPosition {
    pub sensor: SensorId,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    /// Height above the WGS-84 ellipsoid
    #[serde(default)]
    pub altitude_m: f64,
}

// ===== Sink =====

/// Sink output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(rename = "type", default)]
    pub sink_type: SinkType,

    /// Sink name used in logs, defaults to the type name
    #[serde(default)]
    pub name: Option<String>,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log chunk summaries
    #[default]
    Log,
    /// Append JSON lines to a file
    File,
}

impl SinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkType::Log => "log",
            SinkType::File => "file",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_RUN: &str = r#"
[source]
type = "file"
path = "/data/plots.jsonl"

[postprocess]
time_offset_secs = -3600
start_date = "2024-03-01"

[[record_kinds]]
name = "plot"
tod_path = "time.tod"
columns = [
    { path = "pos.0", column = "bearing_deg", kind = "f64" },
    { path = "mode3a", column = "mode3a", kind = "u16" },
]
"#;

    #[test]
    fn test_file_run_defaults() {
        let config: RunConfig = toml::from_str(FILE_RUN).unwrap();
        assert!(!config.is_live());
        assert_eq!(config.max_in_flight(), 4);
        assert_eq!(config.backpressure.live_stall_timeout_ms, 5000);
        assert!(config.postprocess.future_check);
        assert_eq!(config.postprocess.future_slack_secs, 180.0);
        assert_eq!(config.postprocess.midnight_vicinity_secs, 300.0);
        assert_eq!(
            config.postprocess.start_date,
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(config.sink.sink_type, SinkType::Log);

        match &config.source {
            SourceConfig::File(file) => {
                assert_eq!(file.framing, Framing::JsonLines);
                assert_eq!(file.records_per_chunk, 1000);
            }
            other => panic!("unexpected source {other:?}"),
        }

        let plot = config.record_kind("plot").unwrap();
        assert_eq!(plot.columns[1].kind, DataKind::U16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_live_source_parses_endpoints() {
        let config: RunConfig = toml::from_str(
            r#"
[source]
type = "live"
chunk_interval_ms = 200
endpoints = [
    { sensor = "psr_north", bind = "127.0.0.1:30001" },
    { sensor = "psr_north_b", bind = "127.0.0.1:30002", line = 2 },
]

[sink]
type = "file"
params = { path = "/tmp/out.jsonl" }
"#,
        )
        .unwrap();

        assert!(config.is_live());
        assert_eq!(config.max_in_flight(), 2);
        let SourceConfig::Live(live) = &config.source else {
            panic!("expected live source");
        };
        assert_eq!(live.endpoints[0].line, 1);
        assert_eq!(live.endpoints[1].line, 2);
        assert_eq!(live.max_capture_lines, 4);
        assert_eq!(config.sink.params["path"], "/tmp/out.jsonl");
    }

    #[test]
    fn test_range_checks() {
        let mut config: RunConfig = toml::from_str(FILE_RUN).unwrap();
        config.backpressure.file_max_in_flight = 0;
        config.postprocess.midnight_vicinity_secs = 0.0;
        assert!(config.validate().is_err());

        let errors = config.backpressure.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("file_max_in_flight"));
        let errors = config.postprocess.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("midnight_vicinity_secs"));
    }
}
