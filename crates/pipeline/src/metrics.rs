//! Controller counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters of one run, updated by the controller task
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    chunks_decoded: AtomicU64,
    chunks_accepted: AtomicU64,
    chunks_inserted: AtomicU64,
    rows_inserted: AtomicU64,
    empty_chunks: AtomicU64,
    overload_drops: AtomicU64,
    paused_discards: AtomicU64,
    watchdog_drains: AtomicU64,
    future_rows_truncated: AtomicU64,
    decoder_pauses: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc_decoded(&self) {
        self.chunks_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_accepted(&self) {
        self.chunks_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self, rows: usize) {
        self.chunks_inserted.fetch_add(1, Ordering::Relaxed);
        self.rows_inserted.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub(crate) fn inc_empty(&self) {
        self.empty_chunks.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new total
    pub(crate) fn inc_overload_drop(&self) -> u64 {
        self.overload_drops.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn inc_paused_discard(&self) {
        self.paused_discards.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_watchdog_drain(&self) {
        self.watchdog_drains.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_future_rows(&self, rows: usize) {
        self.future_rows_truncated
            .fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub(crate) fn inc_decoder_pause(&self) {
        self.decoder_pauses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_in_flight(&self, in_flight: usize) {
        self.in_flight.store(in_flight, Ordering::Relaxed);
        self.peak_in_flight.fetch_max(in_flight, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ControllerMetricsSnapshot {
        ControllerMetricsSnapshot {
            chunks_decoded: self.chunks_decoded.load(Ordering::Relaxed),
            chunks_accepted: self.chunks_accepted.load(Ordering::Relaxed),
            chunks_inserted: self.chunks_inserted.load(Ordering::Relaxed),
            rows_inserted: self.rows_inserted.load(Ordering::Relaxed),
            empty_chunks: self.empty_chunks.load(Ordering::Relaxed),
            overload_drops: self.overload_drops.load(Ordering::Relaxed),
            paused_discards: self.paused_discards.load(Ordering::Relaxed),
            watchdog_drains: self.watchdog_drains.load(Ordering::Relaxed),
            future_rows_truncated: self.future_rows_truncated.load(Ordering::Relaxed),
            decoder_pauses: self.decoder_pauses.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ControllerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerMetricsSnapshot {
    pub chunks_decoded: u64,
    pub chunks_accepted: u64,
    pub chunks_inserted: u64,
    pub rows_inserted: u64,
    /// Chunks with no rows left after post-processing
    pub empty_chunks: u64,
    pub overload_drops: u64,
    pub paused_discards: u64,
    pub watchdog_drains: u64,
    pub future_rows_truncated: u64,
    pub decoder_pauses: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}
