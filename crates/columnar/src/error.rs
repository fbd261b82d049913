//! Buffer error types

use thiserror::Error;

use crate::DataKind;

/// Recoverable buffer errors
///
/// Invariant violations (mismatched-kind access, out-of-range rows) are not
/// represented here; they panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Column name already declared
    #[error("duplicate column '{name}'")]
    DuplicateColumn { name: String },

    /// Kind name outside the supported set
    #[error("unknown column kind '{kind}'")]
    UnknownKind { kind: String },

    /// Requested column does not exist
    #[error("column '{name}' not found")]
    MissingColumn { name: String },

    /// Same column name, different kinds
    #[error("column '{name}' kind mismatch: expected {expected}, found {actual}")]
    KindMismatch {
        name: String,
        expected: DataKind,
        actual: DataKind,
    },

    /// Operation requires at least one row
    #[error("buffer is empty")]
    EmptyBuffer,
}

impl BufferError {
    pub fn missing_column(name: impl Into<String>) -> Self {
        Self::MissingColumn { name: name.into() }
    }
}

/// Buffer Result type alias
pub type Result<T> = std::result::Result<T, BufferError>;
