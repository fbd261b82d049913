//! # Columnar
//!
//! Typed, named, in-memory record batches.
//!
//! A [`RecordBuffer`] is the data contract handed between every pipeline stage:
//! an ordered set of uniquely named columns plus one authoritative row count.
//! Every column has a fixed [`DataKind`] and a dense value array with a per-row
//! null marker.
//!
//! ## Invariants
//! - Column names are unique within a buffer
//! - A column's kind never changes after creation
//! - No column is populated beyond the buffer's row count
//!
//! Violating an invariant is a programming error and panics. Recoverable
//! conditions (duplicate names, absent columns, incompatible merges) are
//! reported through [`BufferError`].
//!
//! ## Usage Example
//!
//! ```
//! use columnar::{DataKind, RecordBuffer};
//!
//! let mut buffer = RecordBuffer::new();
//! buffer.add_column("tod", DataKind::F64).unwrap();
//! buffer.add_column("callsign", DataKind::Text).unwrap();
//!
//! let row = buffer.push_row();
//! buffer.set_value("tod", row, 43_200.5_f64);
//! buffer.set_value("callsign", row, "DLH4AB".to_string());
//!
//! assert_eq!(buffer.row_count(), 1);
//! assert_eq!(buffer.column_ref::<f64>("tod").get(0), Some(&43_200.5));
//! ```

#[macro_use]
mod macros;

mod buffer;
mod column;
mod error;
mod kind;

pub use buffer::{Column, RecordBuffer};
pub use column::{ColumnData, ColumnMut, TypedColumn};
pub use error::{BufferError, Result};
pub use kind::{DataKind, Scalar};
