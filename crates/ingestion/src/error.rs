//! Ingestion error types

use contracts::ContractError;
use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// A frame could not be read or parsed
    #[error("malformed frame at offset {offset}: {message}")]
    MalformedFrame { offset: u64, message: String },

    /// A frame exceeded the size limit
    #[error("frame at offset {offset} declares {len} bytes (limit {limit})")]
    FrameTooLarge { offset: u64, len: usize, limit: usize },

    /// A live endpoint socket could not be bound
    #[error("cannot bind endpoint for sensor {sensor} on {addr}: {source}")]
    Bind {
        sensor: String,
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Every live endpoint was filtered out
    #[error("no live endpoint left to capture")]
    NoEndpoints,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestionError {
    pub fn malformed(offset: u64, message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            offset,
            message: message.into(),
        }
    }

    /// Attach the decoder name and convert to the contract error
    pub fn into_contract(self, decoder: &str) -> ContractError {
        match self {
            IngestionError::MalformedFrame { offset, message } => {
                ContractError::malformed(decoder, offset, message)
            }
            IngestionError::FrameTooLarge { offset, len, limit } => ContractError::malformed(
                decoder,
                offset,
                format!("frame declares {len} bytes (limit {limit})"),
            ),
            other => ContractError::decode(decoder, other.to_string()),
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
