//! InsertionSink trait - pipeline output interface

use crate::{Chunk, ContractError};

/// Storage sink for post-processed chunks.
///
/// The controller calls [`insert`](LocalInsertionSink::insert) for one chunk
/// at a time and waits for completion before issuing the next.
#[trait_variant::make(InsertionSink: Send)]
pub trait LocalInsertionSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Store every buffer of `chunk`, returning the number of rows written.
    ///
    /// # Errors
    /// Any error is fatal for the run; the controller does not retry.
    async fn insert(&mut self, chunk: Chunk) -> Result<usize, ContractError>;

    /// Flush buffered output (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
