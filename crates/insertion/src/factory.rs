//! Sink factory
//!
//! Builds the sink named by a run's `[sink]` section.

use contracts::{Chunk, ContractError, InsertionSink, SinkConfig, SinkType};
use tracing::instrument;

use crate::error::InsertionError;
use crate::sinks::{FileSink, LogSink};

/// Any sink the configuration can name
pub enum ConfiguredSink {
    Log(LogSink),
    File(FileSink),
}

/// Create the configured sink
#[instrument(
    name = "insertion_create_sink",
    skip(config),
    fields(sink_type = config.sink_type.as_str())
)]
pub async fn create_sink(config: &SinkConfig) -> Result<ConfiguredSink, InsertionError> {
    let name = config
        .name
        .clone()
        .unwrap_or_else(|| config.sink_type.as_str().to_string());
    match config.sink_type {
        SinkType::Log => Ok(ConfiguredSink::Log(LogSink::new(name))),
        SinkType::File => {
            let sink = FileSink::from_params(&name, &config.params)
                .await
                .map_err(|e| InsertionError::sink_creation(&name, e.to_string()))?;
            Ok(ConfiguredSink::File(sink))
        }
    }
}

impl InsertionSink for ConfiguredSink {
    fn name(&self) -> &str {
        match self {
            ConfiguredSink::Log(sink) => sink.name(),
            ConfiguredSink::File(sink) => sink.name(),
        }
    }

    async fn insert(&mut self, chunk: Chunk) -> Result<usize, ContractError> {
        match self {
            ConfiguredSink::Log(sink) => sink.insert(chunk).await,
            ConfiguredSink::File(sink) => sink.insert(chunk).await,
        }
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        match self {
            ConfiguredSink::Log(sink) => sink.flush().await,
            ConfiguredSink::File(sink) => sink.flush().await,
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        match self {
            ConfiguredSink::Log(sink) => sink.close().await,
            ConfiguredSink::File(sink) => sink.close().await,
        }
    }
}
