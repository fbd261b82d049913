//! Run report built from pipeline events

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use contracts::{EventCallback, PipelineEvent};
use observability::{RunMetricsAggregator, RunSummary};
use tracing::info;

/// Minimum spacing of progress log lines
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct RunReport {
    aggregator: RunMetricsAggregator,
    last_progress: Option<Instant>,
}

impl RunReport {
    pub fn shared() -> Arc<Mutex<RunReport>> {
        Arc::new(Mutex::new(RunReport::default()))
    }

    /// Event callback feeding `report`
    pub fn callback(report: Arc<Mutex<RunReport>>) -> EventCallback {
        Arc::new(move |event| {
            if let Ok(mut report) = report.lock() {
                report.record(&event);
            }
        })
    }

    pub fn record(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::ChunkInserted { rows, latency, .. } => {
                self.aggregator
                    .record_insert(*rows, latency.as_secs_f64() * 1e3);
            }
            PipelineEvent::OverloadDrop { .. } => self.aggregator.record_drop(),
            PipelineEvent::ChunkProgress {
                seq,
                records_per_sec,
                fraction,
                estimated_remaining,
            } => {
                let due = self
                    .last_progress
                    .map_or(true, |at| at.elapsed() >= PROGRESS_INTERVAL);
                if due {
                    self.last_progress = Some(Instant::now());
                    info!(
                        seq,
                        records_per_sec = records_per_sec.round() as u64,
                        percent = fraction.map(|f| (f * 1000.0).round() / 10.0),
                        remaining_secs = estimated_remaining.map(|d| d.as_secs()),
                        "progress"
                    );
                }
            }
            PipelineEvent::RunStarted { .. } | PipelineEvent::RunFinished(_) => {}
        }
    }

    pub fn record_future_truncation(&mut self, rows: u64) {
        self.aggregator.record_future_truncation(rows as usize);
    }

    pub fn summary(&self) -> RunSummary {
        self.aggregator.summary()
    }
}
