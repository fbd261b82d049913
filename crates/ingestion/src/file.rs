//! File replay decoder
//!
//! Reads a recording incrementally and cuts a chunk every
//! `records_per_chunk` records. The final chunk carries `is_last`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::{Buf, BytesMut};
use contracts::{
    ContractError, DecodeProgress, DecodedChunk, Decoder, FileSourceConfig, Framing,
};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{debug, info, instrument};

use crate::error::{IngestionError, Result};
use crate::frame::{split_frame, TreeAccumulator};
use crate::metrics::DecoderMetrics;

/// Largest accepted length-prefixed frame
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Decoder replaying a recorded file
pub struct FileDecoder {
    name: String,
    path: PathBuf,
    reader: BufReader<File>,
    framing: Framing,
    records_per_chunk: usize,
    accumulator: TreeAccumulator,
    line: String,
    bytes_total: u64,
    bytes_consumed: u64,
    records_consumed: u64,
    started: Instant,
    finished: bool,
    metrics: Arc<DecoderMetrics>,
}

impl FileDecoder {
    /// Open the configured recording
    #[instrument(name = "file_decoder_open", skip(config), fields(path = %config.path.display()))]
    pub async fn open(config: &FileSourceConfig) -> std::result::Result<Self, ContractError> {
        let name = format!("file:{}", config.path.display());
        Self::open_path(&config.path, config.framing, config.records_per_chunk)
            .await
            .map_err(|e| e.into_contract(&name))
    }

    async fn open_path(path: &Path, framing: Framing, records_per_chunk: usize) -> Result<Self> {
        let file = File::open(path).await?;
        let bytes_total = file.metadata().await?.len();
        info!(
            path = %path.display(),
            bytes = bytes_total,
            framing = ?framing,
            records_per_chunk,
            "opened recording"
        );
        Ok(Self {
            name: format!("file:{}", path.display()),
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            framing,
            records_per_chunk: records_per_chunk.max(1),
            accumulator: TreeAccumulator::default(),
            line: String::new(),
            bytes_total,
            bytes_consumed: 0,
            records_consumed: 0,
            started: Instant::now(),
            finished: false,
            metrics: Arc::new(DecoderMetrics::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metrics(&self) -> Arc<DecoderMetrics> {
        self.metrics.clone()
    }

    /// Read one frame; `None` at a clean end of file
    async fn read_frame(&mut self) -> Result<Option<Value>> {
        match self.framing {
            Framing::JsonLines => self.read_line_frame().await,
            Framing::LengthPrefixed => self.read_prefixed_frame().await,
        }
    }

    async fn read_line_frame(&mut self) -> Result<Option<Value>> {
        loop {
            let offset = self.bytes_consumed;
            self.line.clear();
            let read = self.reader.read_line(&mut self.line).await?;
            if read == 0 {
                return Ok(None);
            }
            self.bytes_consumed += read as u64;

            let text = self.line.trim();
            if text.is_empty() {
                continue;
            }
            return serde_json::from_str(text)
                .map(Some)
                .map_err(|e| IngestionError::malformed(offset, e.to_string()));
        }
    }

    async fn read_prefixed_frame(&mut self) -> Result<Option<Value>> {
        let offset = self.bytes_consumed;
        if self.reader.fill_buf().await?.is_empty() {
            return Ok(None);
        }

        let mut header = [0u8; 4];
        self.read_exact_at(&mut header, offset).await?;
        let len = (&header[..]).get_u32() as usize;
        if len > MAX_FRAME_BYTES {
            return Err(IngestionError::FrameTooLarge {
                offset,
                len,
                limit: MAX_FRAME_BYTES,
            });
        }

        let mut payload = BytesMut::zeroed(len);
        self.read_exact_at(&mut payload, offset).await?;
        self.bytes_consumed += 4 + len as u64;

        serde_json::from_slice(&payload)
            .map(Some)
            .map_err(|e| IngestionError::malformed(offset, e.to_string()))
    }

    async fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(IngestionError::malformed(offset, "truncated frame"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fill_chunk(&mut self) -> Result<DecodedChunk> {
        while self.accumulator.len() < self.records_per_chunk {
            let offset = self.bytes_consumed;
            let Some(frame) = self.read_frame().await? else {
                self.finished = true;
                break;
            };
            let (kind, records) =
                split_frame(frame).map_err(|message| IngestionError::malformed(offset, message))?;
            self.records_consumed += records.len() as u64;
            self.accumulator.push(kind, records);
        }

        let chunk = self.accumulator.take(self.finished);
        self.metrics.record_records(chunk.record_count());
        self.metrics.record_chunk();
        Ok(chunk)
    }
}

impl Decoder for FileDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_live(&self) -> bool {
        false
    }

    async fn next_chunk(&mut self) -> std::result::Result<Option<DecodedChunk>, ContractError> {
        if self.finished {
            return Ok(None);
        }
        let chunk = self.fill_chunk().await.map_err(|e| e.into_contract(&self.name))?;
        debug!(
            decoder = %self.name,
            records = chunk.record_count(),
            kinds = chunk.trees.len(),
            is_last = chunk.is_last,
            "decoded chunk"
        );
        Ok(Some(chunk))
    }

    fn progress(&self) -> DecodeProgress {
        DecodeProgress {
            bytes_consumed: self.bytes_consumed,
            bytes_total: Some(self.bytes_total),
            records_consumed: self.records_consumed,
            elapsed: self.started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config(path: &Path, framing: Framing, records_per_chunk: usize) -> FileSourceConfig {
        FileSourceConfig {
            path: path.to_path_buf(),
            framing,
            records_per_chunk,
        }
    }

    fn jsonl(lines: &[Value]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    async fn drain(decoder: &mut FileDecoder) -> Vec<DecodedChunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = decoder.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_json_lines_chunking() {
        let lines: Vec<Value> = (0..5)
            .map(|i| json!({"kind": "plot", "record": {"tod": i as f64}}))
            .collect();
        let file = jsonl(&lines);
        let mut decoder = FileDecoder::open(&config(file.path(), Framing::JsonLines, 2))
            .await
            .unwrap();

        let chunks = drain(&mut decoder).await;
        let counts: Vec<_> = chunks.iter().map(DecodedChunk::record_count).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        assert!(chunks.last().unwrap().is_last);
        assert!(!chunks[0].is_last);

        let progress = decoder.progress();
        assert_eq!(progress.records_consumed, 5);
        assert_eq!(progress.bytes_consumed, progress.bytes_total.unwrap());
        assert_eq!(progress.fraction(), Some(1.0));
    }

    #[tokio::test]
    async fn test_batch_frame_may_exceed_chunk_size() {
        let file = jsonl(&[
            json!({"kind": "track", "records": [{"tod": 1.0}, {"tod": 2.0}, {"tod": 3.0}]}),
            json!({"kind": "plot", "record": {"tod": 4.0}}),
        ]);
        let mut decoder = FileDecoder::open(&config(file.path(), Framing::JsonLines, 2))
            .await
            .unwrap();

        let first = decoder.next_chunk().await.unwrap().unwrap();
        assert_eq!(first.record_count(), 3);
        assert_eq!(first.trees[0].kind, "track");
    }

    #[tokio::test]
    async fn test_empty_file_yields_single_last_chunk() {
        let file = NamedTempFile::new().unwrap();
        let mut decoder = FileDecoder::open(&config(file.path(), Framing::JsonLines, 10))
            .await
            .unwrap();
        let chunk = decoder.next_chunk().await.unwrap().unwrap();
        assert!(chunk.is_last);
        assert!(chunk.is_empty());
        assert!(decoder.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_line_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", json!({"kind": "plot", "record": {"tod": 1.0}})).unwrap();
        writeln!(file, "{{not json").unwrap();
        let mut decoder = FileDecoder::open(&config(file.path(), Framing::JsonLines, 10))
            .await
            .unwrap();

        let err = decoder.next_chunk().await.unwrap_err();
        match err {
            ContractError::Malformed { offset, .. } => assert!(offset > 0),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_length_prefixed_frames() {
        let mut data = BytesMut::new();
        for i in 0..3 {
            let payload = serde_json::to_vec(&json!({
                "kind": "plot",
                "record": {"tod": i as f64}
            }))
            .unwrap();
            data.put_u32(payload.len() as u32);
            data.put_slice(&payload);
        }
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        let mut decoder = FileDecoder::open(&config(file.path(), Framing::LengthPrefixed, 100))
            .await
            .unwrap();
        let chunk = decoder.next_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.record_count(), 3);
        assert!(chunk.is_last);
    }

    #[tokio::test]
    async fn test_length_prefixed_truncated() {
        let mut data = BytesMut::new();
        data.put_u32(100);
        data.put_slice(b"{\"kind\"");
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        let mut decoder = FileDecoder::open(&config(file.path(), Framing::LengthPrefixed, 100))
            .await
            .unwrap();
        let err = decoder.next_chunk().await.unwrap_err();
        assert!(err.to_string().contains("truncated frame"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = FileDecoder::open(&config(
            Path::new("/nonexistent/trackfeed.jsonl"),
            Framing::JsonLines,
            10,
        ))
        .await;
        assert!(matches!(result, Err(ContractError::Decode { .. })));
    }
}
