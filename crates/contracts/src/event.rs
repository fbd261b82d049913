//! Outward pipeline signals

use std::sync::Arc;
use std::time::Duration;

/// Event emitted by the pipeline controller
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Decoding started
    RunStarted { source: String, live: bool },

    /// A chunk left the decoder
    ChunkProgress {
        seq: u64,
        records_per_sec: f64,
        /// Consumed share of a finite source
        fraction: Option<f64>,
        estimated_remaining: Option<Duration>,
    },

    /// A chunk reached the sink
    ChunkInserted {
        seq: u64,
        rows: usize,
        latency: Duration,
    },

    /// Live overload: a decoded chunk was discarded
    OverloadDrop { seq: u64, dropped_total: u64 },

    /// The run ended
    RunFinished(RunOutcome),
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Source exhausted and every chunk inserted
    Completed { chunks_inserted: u64, rows_inserted: u64 },
    /// Stopped by the caller
    Stopped,
    /// Decoder or sink failure
    Failed { message: String },
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

/// Event callback type
pub type EventCallback = Arc<dyn Fn(PipelineEvent) + Send + Sync>;
