//! Data handed between pipeline stages
//!
//! - [`DecodedChunk`]: decoder output, record trees grouped per kind
//! - [`Chunk`]: mapper output, one [`RecordBuffer`] per kind
//! - [`DecodeProgress`]: decoder position, used for progress events

use std::collections::BTreeMap;
use std::time::Duration;

use columnar::RecordBuffer;
use serde_json::Value;

/// Record trees of one kind.
///
/// `tree` is a JSON array of record objects in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedTree {
    pub kind: String,
    pub tree: Value,
}

impl TaggedTree {
    pub fn new(kind: impl Into<String>, records: Vec<Value>) -> Self {
        Self {
            kind: kind.into(),
            tree: Value::Array(records),
        }
    }

    /// Number of records in the tree (0 if it is not an array)
    pub fn record_count(&self) -> usize {
        self.tree.as_array().map_or(0, Vec::len)
    }
}

/// One decoded unit of the source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedChunk {
    /// Record trees in first-seen kind order
    pub trees: Vec<TaggedTree>,
    /// Set on the final chunk of a finite source
    pub is_last: bool,
}

impl DecodedChunk {
    pub fn record_count(&self) -> usize {
        self.trees.iter().map(TaggedTree::record_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

/// Decoder position
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodeProgress {
    pub bytes_consumed: u64,
    /// Known for files, `None` for live feeds
    pub bytes_total: Option<u64>,
    pub records_consumed: u64,
    pub elapsed: Duration,
}

impl DecodeProgress {
    /// Mean decode rate since start
    pub fn records_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.records_consumed as f64 / secs
    }

    /// Consumed share of the source in `[0, 1]`
    pub fn fraction(&self) -> Option<f64> {
        match self.bytes_total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_consumed as f64 / total as f64).min(1.0)),
            None => None,
        }
    }

    /// Remaining time extrapolated from the byte rate so far
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let total = self.bytes_total?;
        if self.bytes_consumed == 0 {
            return None;
        }
        let remaining = total.saturating_sub(self.bytes_consumed) as f64;
        let per_byte = self.elapsed.as_secs_f64() / self.bytes_consumed as f64;
        Some(Duration::from_secs_f64(remaining * per_byte))
    }
}

/// Mapped record sets of one decoded unit.
///
/// The unit of backpressure accounting. Buffers are keyed by record kind.
#[derive(Debug, Default)]
pub struct Chunk {
    pub seq: u64,
    pub buffers: BTreeMap<String, RecordBuffer>,
    pub is_last: bool,
}

impl Chunk {
    pub fn new(seq: u64, is_last: bool) -> Self {
        Self {
            seq,
            buffers: BTreeMap::new(),
            is_last,
        }
    }

    /// Total rows across all buffers
    pub fn row_count(&self) -> usize {
        self.buffers.values().map(RecordBuffer::row_count).sum()
    }

    /// True when no buffer holds a row
    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(RecordBuffer::is_empty)
    }

    /// Remove buffers without rows, returning their kinds
    pub fn remove_empty(&mut self) -> Vec<String> {
        let empty: Vec<String> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| buffer.is_empty())
            .map(|(kind, _)| kind.clone())
            .collect();
        for kind in &empty {
            self.buffers.remove(kind);
        }
        empty
    }
}
