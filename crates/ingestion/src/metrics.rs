//! Decoder and mapper counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Decoder metrics
#[derive(Debug, Default)]
pub struct DecoderMetrics {
    /// Records accepted into chunks
    pub records_decoded: AtomicU64,

    /// Chunks handed to the controller
    pub chunks_emitted: AtomicU64,

    /// Live datagrams received
    pub datagrams_received: AtomicU64,

    /// Live datagrams that could not be decoded
    pub datagrams_rejected: AtomicU64,

    /// Live datagrams dropped because the decoder lagged
    pub datagrams_dropped: AtomicU64,
}

impl DecoderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_records(&self, count: usize) {
        self.records_decoded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_chunk(&self) {
        self.chunks_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_datagram(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.datagrams_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DecoderMetricsSnapshot {
        DecoderMetricsSnapshot {
            records_decoded: self.records_decoded.load(Ordering::Relaxed),
            chunks_emitted: self.chunks_emitted.load(Ordering::Relaxed),
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_rejected: self.datagrams_rejected.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Decoder metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderMetricsSnapshot {
    pub records_decoded: u64,
    pub chunks_emitted: u64,
    pub datagrams_received: u64,
    pub datagrams_rejected: u64,
    pub datagrams_dropped: u64,
}

/// Mapper metrics
#[derive(Debug, Default)]
pub struct MapperMetrics {
    /// Rows written into buffers
    pub rows_mapped: AtomicU64,

    /// Records of kinds without a schema
    pub unknown_kind_records: AtomicU64,

    /// Rows removed for a null time-of-day
    pub null_tod_rows: AtomicU64,

    /// Buffers dropped for a missing system column
    pub buffers_dropped: AtomicU64,

    /// Cells stored as null because the value did not fit the column kind
    pub conversion_failures: AtomicU64,
}

impl MapperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, count: usize) {
        counter.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MapperMetricsSnapshot {
        MapperMetricsSnapshot {
            rows_mapped: self.rows_mapped.load(Ordering::Relaxed),
            unknown_kind_records: self.unknown_kind_records.load(Ordering::Relaxed),
            null_tod_rows: self.null_tod_rows.load(Ordering::Relaxed),
            buffers_dropped: self.buffers_dropped.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
        }
    }
}

/// Mapper metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapperMetricsSnapshot {
    pub rows_mapped: u64,
    pub unknown_kind_records: u64,
    pub null_tod_rows: u64,
    pub buffers_dropped: u64,
    pub conversion_failures: u64,
}
