//! MemorySink - keeps inserted chunks in memory
//!
//! A [`MemorySinkHandle`] stays with the caller while the sink itself moves
//! into the pipeline, so inserted chunks can be inspected during and after a
//! run. Optional delay and failure injection make it usable for exercising
//! backpressure and error paths.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use contracts::{Chunk, ContractError, InsertionSink};
use tracing::debug;

#[derive(Debug, Default)]
struct Shared {
    chunks: Vec<Chunk>,
    closed: bool,
}

/// Read side of a [`MemorySink`]
#[derive(Debug, Clone, Default)]
pub struct MemorySinkHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MemorySinkHandle {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        // a panicking test thread must not hide the collected chunks
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sequence numbers of inserted chunks, in insertion order
    pub fn seqs(&self) -> Vec<u64> {
        self.lock().chunks.iter().map(|chunk| chunk.seq).collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn row_count(&self) -> usize {
        self.lock().chunks.iter().map(Chunk::row_count).sum()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Run `f` over the inserted chunks
    pub fn with_chunks<R>(&self, f: impl FnOnce(&[Chunk]) -> R) -> R {
        f(&self.lock().chunks)
    }

    /// Take every inserted chunk out of the sink
    pub fn take(&self) -> Vec<Chunk> {
        std::mem::take(&mut self.lock().chunks)
    }
}

/// In-memory sink
#[derive(Debug)]
pub struct MemorySink {
    name: String,
    handle: MemorySinkHandle,
    delay: Option<Duration>,
    fail_on_seq: Option<u64>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> (Self, MemorySinkHandle) {
        let handle = MemorySinkHandle::default();
        let sink = Self {
            name: name.into(),
            handle: handle.clone(),
            delay: None,
            fail_on_seq: None,
        };
        (sink, handle)
    }

    /// Sleep `delay` before completing every insert
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the insert of chunk `seq`
    pub fn fail_on(mut self, seq: u64) -> Self {
        self.fail_on_seq = Some(seq);
        self
    }
}

impl InsertionSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&mut self, chunk: Chunk) -> Result<usize, ContractError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_seq == Some(chunk.seq) {
            return Err(ContractError::sink_write(
                &self.name,
                format!("injected failure on chunk {}", chunk.seq),
            ));
        }
        let rows = chunk.row_count();
        debug!(sink = %self.name, seq = chunk.seq, rows, "chunk stored");
        self.handle.lock().chunks.push(chunk);
        Ok(rows)
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.handle.lock().closed = true;
        Ok(())
    }
}
