//! Layered error definitions
//!
//! Categorized by source: config / decode / buffer / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Decode Errors =====
    /// Source could not be opened or read
    #[error("decoder '{decoder}' failed: {message}")]
    Decode { decoder: String, message: String },

    /// Frame or record tree could not be parsed
    #[error("decoder '{decoder}' malformed input at offset {offset}: {message}")]
    Malformed {
        decoder: String,
        offset: u64,
        message: String,
    },

    // ===== Buffer Errors =====
    /// Columnar buffer operation failed
    #[error("buffer error: {0}")]
    Buffer(#[from] columnar::BufferError),

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create decoder failure
    pub fn decode(decoder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            decoder: decoder.into(),
            message: message.into(),
        }
    }

    /// Create malformed-input error
    pub fn malformed(decoder: impl Into<String>, offset: u64, message: impl Into<String>) -> Self {
        Self::Malformed {
            decoder: decoder.into(),
            offset,
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink connection error
    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
