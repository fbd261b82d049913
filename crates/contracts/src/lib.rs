//! # Contracts
//!
//! Interface contracts shared by every pipeline crate: the data handed
//! between stages, the stage traits, run configuration and outward events.
//! Business crates depend on this crate, never on each other's internals.
//!
//! ## Time Model
//! - Records carry a time-of-day (`tod`, seconds since midnight UTC, f64)
//! - Post-processing reconstructs an absolute `timestamp` (ms since Unix epoch)
//! - `rec_num` is a run-wide unique record key assigned by the mapper

mod chunk;
mod config;
mod decoder;
mod error;
mod event;
mod sensor_id;
mod sink;

pub mod columns;

pub use chunk::*;
pub use config::*;
pub use decoder::{Decoder, LocalDecoder};
pub use error::*;
pub use event::*;
pub use sensor_id::SensorId;
pub use sink::{InsertionSink, LocalInsertionSink};

pub use columnar::{DataKind, RecordBuffer};
