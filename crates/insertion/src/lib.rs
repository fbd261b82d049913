//! # Insertion
//!
//! Storage sinks for post-processed chunks.
//!
//! - [`LogSink`] logs a per-kind summary of every chunk
//! - [`FileSink`] appends one JSON line per record kind and chunk
//! - [`MemorySink`] keeps chunks in memory, for tests and embedding
//!
//! [`create_sink`] builds the configured sink of a run.

pub mod error;
pub mod factory;
pub mod sinks;

pub use error::InsertionError;
pub use factory::{create_sink, ConfiguredSink};
pub use sinks::{FileSink, LogSink, MemorySink, MemorySinkHandle};
