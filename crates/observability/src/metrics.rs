//! Pipeline metrics
//!
//! Thin helpers over the `metrics` facade, plus an in-memory aggregator for
//! the end-of-run summary.

use metrics::{counter, gauge, histogram};

/// Why a decoded chunk never reached the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Live run over its in-flight bound
    Overload,
    /// Live run paused
    Paused,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::Overload => "overload",
            DropReason::Paused => "paused",
        }
    }
}

/// Record a chunk leaving the decoder
pub fn record_chunk_decoded(records: usize) {
    counter!("trackfeed_chunks_decoded_total").increment(1);
    counter!("trackfeed_records_decoded_total").increment(records as u64);
}

/// Record a decoded chunk dropped before mapping
pub fn record_chunk_dropped(reason: DropReason) {
    counter!("trackfeed_chunks_dropped_total", "reason" => reason.as_str()).increment(1);
}

/// Record a completed insert
pub fn record_chunk_inserted(sink_name: &str, rows: usize, latency_ms: f64) {
    counter!("trackfeed_chunks_inserted_total", "sink" => sink_name.to_string()).increment(1);
    counter!("trackfeed_rows_inserted_total", "sink" => sink_name.to_string())
        .increment(rows as u64);
    histogram!("trackfeed_insert_latency_ms", "sink" => sink_name.to_string()).record(latency_ms);
}

/// Record a failed insert
pub fn record_insert_failure(sink_name: &str) {
    counter!("trackfeed_insert_failures_total", "sink" => sink_name.to_string()).increment(1);
}

/// Record rows cut by the future-timestamp check
pub fn record_future_rows_truncated(rows: usize) {
    if rows > 0 {
        counter!("trackfeed_future_rows_truncated_total").increment(rows as u64);
    }
}

/// Record buffers removed from chunks (emptied or unusable)
pub fn record_buffers_dropped(stage: &'static str, count: usize) {
    if count > 0 {
        counter!("trackfeed_buffers_dropped_total", "stage" => stage).increment(count as u64);
    }
}

/// Record projection outcome of one chunk
pub fn record_projection(projected: usize, unprojected: usize) {
    if projected > 0 {
        counter!("trackfeed_rows_projected_total").increment(projected as u64);
    }
    if unprojected > 0 {
        counter!("trackfeed_rows_unprojected_total").increment(unprojected as u64);
    }
}

/// Record current in-flight chunk count
pub fn record_in_flight(in_flight: usize) {
    gauge!("trackfeed_chunks_in_flight").set(in_flight as f64);
}

/// Record time spent in one stage
pub fn record_stage_latency_ms(stage: &'static str, latency_ms: f64) {
    histogram!("trackfeed_stage_latency_ms", "stage" => stage).record(latency_ms);
}

/// Run metrics aggregator
///
/// Aggregates in memory for the summary printed at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct RunMetricsAggregator {
    pub chunks_inserted: u64,
    pub rows_inserted: u64,
    pub chunks_dropped: u64,
    pub future_rows_truncated: u64,
    /// Insert latency in milliseconds
    pub insert_latency: RunningStats,
    /// Rows per inserted chunk
    pub chunk_rows: RunningStats,
}

impl RunMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_insert(&mut self, rows: usize, latency_ms: f64) {
        self.chunks_inserted += 1;
        self.rows_inserted += rows as u64;
        self.insert_latency.push(latency_ms);
        self.chunk_rows.push(rows as f64);
    }

    pub fn record_drop(&mut self) {
        self.chunks_dropped += 1;
    }

    pub fn record_future_truncation(&mut self, rows: usize) {
        self.future_rows_truncated += rows as u64;
    }

    pub fn summary(&self) -> RunSummary {
        let decoded = self.chunks_inserted + self.chunks_dropped;
        RunSummary {
            chunks_inserted: self.chunks_inserted,
            rows_inserted: self.rows_inserted,
            chunks_dropped: self.chunks_dropped,
            drop_rate: if decoded > 0 {
                self.chunks_dropped as f64 / decoded as f64 * 100.0
            } else {
                0.0
            },
            future_rows_truncated: self.future_rows_truncated,
            insert_latency_ms: StatsSummary::from(&self.insert_latency),
            chunk_rows: StatsSummary::from(&self.chunk_rows),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// End-of-run summary
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub chunks_inserted: u64,
    pub rows_inserted: u64,
    pub chunks_dropped: u64,
    pub drop_rate: f64,
    pub future_rows_truncated: u64,
    pub insert_latency_ms: StatsSummary,
    pub chunk_rows: StatsSummary,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Run Summary ===")?;
        writeln!(f, "Chunks inserted: {}", self.chunks_inserted)?;
        writeln!(f, "Rows inserted: {}", self.rows_inserted)?;
        writeln!(
            f,
            "Chunks dropped: {} ({:.2}%)",
            self.chunks_dropped, self.drop_rate
        )?;
        writeln!(f, "Future rows truncated: {}", self.future_rows_truncated)?;
        writeln!(f, "Insert latency (ms): {}", self.insert_latency_ms)?;
        writeln!(f, "Rows per chunk: {}", self.chunk_rows)?;
        Ok(())
    }
}

/// Summary of one running statistic
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean and variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
