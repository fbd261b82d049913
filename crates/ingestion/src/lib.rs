//! # Ingestion
//!
//! Record decoding and mapping.
//!
//! Responsibilities:
//! - Replay recordings (`json_lines` / `length_prefixed` framing)
//! - Capture live UDP feeds, one socket per sensor endpoint
//! - Group decoded records per kind into chunks
//! - Map record trees into typed columnar buffers
//!
//! ## Usage Example
//!
//! ```ignore
//! use contracts::Decoder;
//! use ingestion::{Mapper, SourceDecoder};
//!
//! let mut decoder = SourceDecoder::open(&config.source).await?;
//! let mapper = Mapper::from_config(&config)?;
//!
//! let mut seq = 0;
//! while let Some(decoded) = decoder.next_chunk().await? {
//!     let base = mapper.reserve(decoded.record_count());
//!     let chunk = mapper.map(decoded, seq, base);
//!     seq += 1;
//! }
//! ```

mod error;
mod file;
mod frame;
mod live;
mod mapper;
mod metrics;
mod path;
mod source;

pub use error::{IngestionError, Result};
pub use file::{FileDecoder, MAX_FRAME_BYTES};
pub use frame::make_frame;
pub use live::LiveDecoder;
pub use mapper::{KindSchema, Mapper};
pub use metrics::{DecoderMetrics, DecoderMetricsSnapshot, MapperMetrics, MapperMetricsSnapshot};
pub use path::FieldPath;
pub use source::SourceDecoder;
