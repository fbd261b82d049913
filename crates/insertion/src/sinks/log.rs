//! LogSink - logs chunk summaries via tracing

use contracts::{Chunk, ContractError, InsertionSink};
use tracing::{info, instrument};

/// Sink that logs a summary of every chunk and discards the rows
pub struct LogSink {
    name: String,
    chunks: u64,
    rows: u64,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chunks: 0,
            rows: 0,
        }
    }

    fn log_chunk_summary(&self, chunk: &Chunk) {
        for (kind, buffer) in &chunk.buffers {
            info!(
                sink = %self.name,
                seq = chunk.seq,
                kind = %kind,
                rows = buffer.row_count(),
                columns = buffer.column_count(),
                "chunk buffer received"
            );
        }
    }
}

impl InsertionSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_insert",
        skip(self, chunk),
        fields(sink = %self.name, seq = chunk.seq)
    )]
    async fn insert(&mut self, chunk: Chunk) -> Result<usize, ContractError> {
        self.log_chunk_summary(&chunk);
        let rows = chunk.row_count();
        self.chunks += 1;
        self.rows += rows as u64;
        Ok(rows)
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            chunks = self.chunks,
            rows = self.rows,
            "LogSink closed"
        );
        Ok(())
    }
}
