//! Decoder selected from the run configuration

use std::sync::Arc;

use contracts::{ContractError, DecodeProgress, DecodedChunk, Decoder, SourceConfig};

use crate::file::FileDecoder;
use crate::live::LiveDecoder;
use crate::metrics::DecoderMetrics;

/// Concrete decoder for a [`SourceConfig`]
pub enum SourceDecoder {
    File(FileDecoder),
    Live(LiveDecoder),
}

impl SourceDecoder {
    /// Open the recording or bind the live endpoints
    pub async fn open(source: &SourceConfig) -> Result<Self, ContractError> {
        match source {
            SourceConfig::File(file) => FileDecoder::open(file).await.map(Self::File),
            SourceConfig::Live(live) => LiveDecoder::bind(live).await.map(Self::Live),
        }
    }

    pub fn metrics(&self) -> Arc<DecoderMetrics> {
        match self {
            SourceDecoder::File(decoder) => decoder.metrics(),
            SourceDecoder::Live(decoder) => decoder.metrics(),
        }
    }
}

impl Decoder for SourceDecoder {
    fn name(&self) -> &str {
        match self {
            SourceDecoder::File(decoder) => decoder.name(),
            SourceDecoder::Live(decoder) => decoder.name(),
        }
    }

    fn is_live(&self) -> bool {
        matches!(self, SourceDecoder::Live(_))
    }

    async fn next_chunk(&mut self) -> Result<Option<DecodedChunk>, ContractError> {
        match self {
            SourceDecoder::File(decoder) => decoder.next_chunk().await,
            SourceDecoder::Live(decoder) => decoder.next_chunk().await,
        }
    }

    fn progress(&self) -> DecodeProgress {
        match self {
            SourceDecoder::File(decoder) => decoder.progress(),
            SourceDecoder::Live(decoder) => decoder.progress(),
        }
    }
}
