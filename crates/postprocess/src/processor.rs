//! Per-chunk post-processing
//!
//! Stages run in a fixed order on every buffer of a chunk:
//!
//! 1. manual time offset
//! 2. future-timestamp rejection (live runs only)
//! 3. day-rollover reconstruction into `timestamp`
//! 4. sensor-position projection into `latitude` / `longitude`
//! 5. derived kinematics

use std::collections::{HashMap, HashSet};

use columnar::RecordBuffer;
use contracts::{columns, Chunk, DataKind, PostprocessConfig, RunConfig, SensorId, SensorPosition};
use tracing::{debug, error, instrument, warn};

use crate::clock::{time_of_day, SharedClock};
use crate::kinematics;
use crate::projection::ProjectionContext;
use crate::temporal::{wrap_tod, TemporalContext, SECONDS_PER_DAY};

/// What one `process` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostprocessReport {
    pub rows_in: usize,
    pub future_rows_truncated: usize,
    pub buffers_removed: usize,
    pub rows_projected: usize,
    pub rows_unprojected: usize,
    pub kinematics_rows: usize,
}

/// Whether `tod` lies more than `slack` seconds after `now_tod`.
///
/// Near either day edge the two values may sit on different sides of
/// midnight, in which case the difference is shifted by one day.
pub fn is_future(tod: f64, now_tod: f64, slack: f64, vicinity: f64) -> bool {
    let mut diff = tod - now_tod;
    if now_tod < vicinity && tod > SECONDS_PER_DAY - vicinity {
        diff -= SECONDS_PER_DAY;
    } else if now_tod > SECONDS_PER_DAY - vicinity && tod < vicinity {
        diff += SECONDS_PER_DAY;
    }
    diff > slack
}

/// Stateful post-processor of one run.
///
/// Owns the temporal context, so chunks must be processed one at a time in
/// sequence order.
pub struct Postprocessor {
    settings: PostprocessConfig,
    live: bool,
    temporal: TemporalContext,
    positions: HashMap<SensorId, SensorPosition>,
    /// Created on first use per sensor
    projections: HashMap<SensorId, ProjectionContext>,
    /// Sensors already reported as unknown
    unknown_sensors: HashSet<String>,
    clock: SharedClock,
}

impl std::fmt::Debug for Postprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Postprocessor")
            .field("settings", &self.settings)
            .field("live", &self.live)
            .field("temporal", &self.temporal)
            .field("sensors", &self.positions.len())
            .finish_non_exhaustive()
    }
}

impl Postprocessor {
    pub fn new(
        settings: PostprocessConfig,
        live: bool,
        temporal: TemporalContext,
        sensors: &[SensorPosition],
        clock: SharedClock,
    ) -> Self {
        Self {
            settings,
            live,
            temporal,
            positions: sensors
                .iter()
                .map(|position| (position.sensor.clone(), position.clone()))
                .collect(),
            projections: HashMap::new(),
            unknown_sensors: HashSet::new(),
            clock,
        }
    }

    /// Build from a run configuration
    pub fn from_config(config: &RunConfig, clock: SharedClock) -> Self {
        Self::for_mode(config, config.is_live(), clock)
    }

    /// Build from a run configuration for an explicit source mode.
    ///
    /// File runs start on `start_date` (today if unset); live runs start on
    /// the clock's date with the after-midnight preset.
    pub fn for_mode(config: &RunConfig, live: bool, clock: SharedClock) -> Self {
        let settings = config.postprocess.clone();
        let vicinity = settings.midnight_vicinity_secs;
        let now = clock.now();
        let temporal = if live {
            TemporalContext::for_live(now, vicinity)
        } else {
            TemporalContext::new(settings.start_date.unwrap_or(now.date_naive()), vicinity)
        };
        Self::new(settings, live, temporal, &config.sensors, clock)
    }

    pub fn temporal(&self) -> &TemporalContext {
        &self.temporal
    }

    /// Run every stage on `chunk`
    #[instrument(
        name = "postprocess_chunk",
        level = "debug",
        skip(self, chunk),
        fields(seq = chunk.seq, rows = chunk.row_count())
    )]
    pub fn process(&mut self, chunk: &mut Chunk) -> PostprocessReport {
        let mut report = PostprocessReport {
            rows_in: chunk.row_count(),
            ..Default::default()
        };

        if self.settings.time_offset_secs != 0.0 {
            for (kind, buffer) in chunk.buffers.iter_mut() {
                apply_offset(kind, buffer, self.settings.time_offset_secs);
            }
        }

        if self.live && self.settings.future_check {
            let now_tod = time_of_day(self.clock.now());
            for (kind, buffer) in chunk.buffers.iter_mut() {
                report.future_rows_truncated += self.truncate_future(kind, buffer, now_tod);
            }
            let removed = chunk.remove_empty();
            if !removed.is_empty() {
                debug!(seq = chunk.seq, kinds = ?removed, "buffers emptied by future check");
            }
            report.buffers_removed = removed.len();
        }

        for (kind, buffer) in chunk.buffers.iter_mut() {
            self.write_timestamps(kind, buffer);
            let (projected, unprojected) = self.project(kind, buffer);
            report.rows_projected += projected;
            report.rows_unprojected += unprojected;
            report.kinematics_rows += kinematics::derive(buffer);
        }

        report
    }

    fn truncate_future(&self, kind: &str, buffer: &mut RecordBuffer, now_tod: f64) -> usize {
        let Ok(tod) = buffer.try_column_ref::<f64>(columns::TOD) else {
            return 0;
        };
        let first = (0..buffer.row_count()).find(|row| {
            tod.get(*row).is_some_and(|value| {
                is_future(
                    *value,
                    now_tod,
                    self.settings.future_slack_secs,
                    self.settings.midnight_vicinity_secs,
                )
            })
        });
        let Some(first) = first else {
            return 0;
        };
        let dropped = buffer.row_count() - first;
        warn!(
            kind,
            row = first,
            dropped,
            now_tod,
            "future time of day, buffer truncated"
        );
        buffer.truncate(first);
        dropped
    }

    fn write_timestamps(&mut self, kind: &str, buffer: &mut RecordBuffer) {
        let tods = match read_f64(buffer, columns::TOD) {
            Some(tods) => tods,
            None => {
                error!(kind, "no f64 time-of-day column, timestamps not written");
                return;
            }
        };
        if let Err(e) = buffer.ensure_column(columns::TIMESTAMP, DataKind::I64) {
            error!(kind, error = %e, "cannot write timestamp column");
            return;
        }
        let stamps: Vec<Option<i64>> = tods
            .into_iter()
            .map(|tod| tod.map(|tod| self.temporal.timestamp_ms(tod)))
            .collect();
        let mut column = buffer.column::<i64>(columns::TIMESTAMP);
        for (row, stamp) in stamps.into_iter().enumerate() {
            column.set_opt(row, stamp);
        }
    }

    /// Returns `(projected, unprojected)` row counts
    fn project(&mut self, kind: &str, buffer: &mut RecordBuffer) -> (usize, usize) {
        let (Some(bearings), Some(ranges)) = (
            read_f64(buffer, columns::BEARING_DEG),
            read_f64(buffer, columns::RANGE_M),
        ) else {
            return (0, 0);
        };
        let Ok(sensors) = buffer.try_column_ref::<String>(columns::SENSOR_ID) else {
            debug!(kind, "polar columns without sensor_id, not projected");
            return (0, 0);
        };
        let sensors: Vec<Option<String>> = sensors.iter().map(|s| s.cloned()).collect();
        let altitudes = read_f64(buffer, columns::ALTITUDE_M);

        let mut positions = Vec::new();
        let mut unprojected = 0;
        for row in 0..buffer.row_count() {
            let (Some(bearing), Some(range)) = (bearings[row], ranges[row]) else {
                continue;
            };
            let Some(sensor) = sensors.get(row).cloned().flatten() else {
                unprojected += 1;
                continue;
            };
            let altitude = altitudes.as_ref().and_then(|column| column[row]);
            match self.context_for(&sensor) {
                Some(context) => {
                    let (lat, lon) = context.project(bearing, range, altitude);
                    positions.push((row, lat, lon));
                }
                None => unprojected += 1,
            }
        }

        if positions.is_empty() {
            return (0, unprojected);
        }
        for name in [columns::LATITUDE, columns::LONGITUDE] {
            if let Err(e) = buffer.ensure_column(name, DataKind::F64) {
                error!(kind, error = %e, "cannot write projected position");
                return (0, unprojected + positions.len());
            }
        }
        {
            let mut latitude = buffer.column::<f64>(columns::LATITUDE);
            for (row, lat, _) in &positions {
                latitude.set(*row, *lat);
            }
        }
        let mut longitude = buffer.column::<f64>(columns::LONGITUDE);
        for (row, _, lon) in &positions {
            longitude.set(*row, *lon);
        }
        (positions.len(), unprojected)
    }

    fn context_for(&mut self, sensor: &str) -> Option<&ProjectionContext> {
        if !self.projections.contains_key(sensor) {
            let Some(position) = self.positions.get(sensor) else {
                if self.unknown_sensors.insert(sensor.to_string()) {
                    error!(sensor, "no reference position for sensor, records not projected");
                }
                return None;
            };
            debug!(sensor, lat = position.latitude, lon = position.longitude, "projection context created");
            self.projections
                .insert(position.sensor.clone(), ProjectionContext::new(position));
        }
        self.projections.get(sensor)
    }
}

/// Shift every time of day by `offset` seconds, wrapping into one day
fn apply_offset(kind: &str, buffer: &mut RecordBuffer, offset: f64) {
    let Some(tods) = read_f64(buffer, columns::TOD) else {
        return;
    };
    let Ok(mut column) = buffer.try_column::<f64>(columns::TOD) else {
        return;
    };
    for (row, tod) in tods.into_iter().enumerate() {
        if let Some(tod) = tod {
            column.set(row, wrap_tod(tod + offset));
        }
    }
    debug!(kind, offset, "time offset applied");
}

/// Copy an f64 column out as options, padded to the row count
fn read_f64(buffer: &RecordBuffer, name: &str) -> Option<Vec<Option<f64>>> {
    let column = buffer.try_column_ref::<f64>(name).ok()?;
    Some((0..buffer.row_count()).map(|row| column.get(row).copied()).collect())
}
