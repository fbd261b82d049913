//! Decoder trait - ingestion input interface

use crate::{ContractError, DecodeProgress, DecodedChunk};

/// Source of decoded record trees.
///
/// A decoder is driven by a single task: the controller calls
/// [`next_chunk`](LocalDecoder::next_chunk) until it yields `None` or a
/// chunk flagged `is_last`. Any error is fatal for the run.
#[trait_variant::make(Decoder: Send)]
pub trait LocalDecoder {
    /// Decoder name (used for logging/events)
    fn name(&self) -> &str;

    /// Whether the source is an unbounded live feed
    fn is_live(&self) -> bool;

    /// Decode the next unit.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<DecodedChunk>, ContractError>;

    /// Position after the most recent chunk
    fn progress(&self) -> DecodeProgress;
}
