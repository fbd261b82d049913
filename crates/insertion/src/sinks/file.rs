//! FileSink - appends chunk buffers to a JSON-lines file
//!
//! Every non-empty buffer becomes one line:
//! `{"seq": 7, "kind": "plot", "rows": [{...}, ...]}`.

use std::collections::HashMap;
use std::path::PathBuf;

use contracts::{Chunk, ContractError, InsertionSink};
use serde_json::json;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file
    pub path: PathBuf,
    /// Append to an existing file instead of truncating it
    pub append: bool,
}

impl FileSinkConfig {
    /// Create config from params map.
    ///
    /// Recognised keys: `path` (required), `append` (`true`/`false`).
    pub fn from_params(params: &HashMap<String, String>) -> std::io::Result<Self> {
        let path = params.get("path").map(PathBuf::from).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing 'path' parameter")
        })?;
        let append = match params.get("append").map(String::as_str) {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid 'append' value '{other}'"),
                ))
            }
        };
        Ok(Self { path, append })
    }
}

/// Sink that writes buffers as JSON lines
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

impl FileSink {
    /// Open the output file, creating parent directories
    pub async fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(config.append)
            .truncate(!config.append)
            .open(&config.path)
            .await?;
        info!(path = %config.path.display(), append = config.append, "FileSink opened");

        Ok(Self {
            name: name.into(),
            config,
            writer: Some(BufWriter::new(file)),
            lines: 0,
        })
    }

    /// Create from params map (for factory)
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params)?;
        Self::new(name, config).await
    }

    pub fn path(&self) -> &std::path::Path {
        &self.config.path
    }

    async fn write_chunk(&mut self, chunk: &Chunk) -> std::io::Result<usize> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink already closed")
        })?;

        let mut rows = 0;
        for (kind, buffer) in &chunk.buffers {
            if buffer.is_empty() {
                continue;
            }
            let line = json!({
                "seq": chunk.seq,
                "kind": kind,
                "rows": buffer.to_record_tree(),
            });
            let mut bytes = serde_json::to_vec(&line)?;
            bytes.push(b'\n');
            writer.write_all(&bytes).await?;
            rows += buffer.row_count();
            self.lines += 1;
        }
        Ok(rows)
    }
}

impl InsertionSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_insert",
        skip(self, chunk),
        fields(sink = %self.name, seq = chunk.seq)
    )]
    async fn insert(&mut self, chunk: Chunk) -> Result<usize, ContractError> {
        let rows = self.write_chunk(&chunk).await.map_err(|e| {
            error!(sink = %self.name, seq = chunk.seq, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })?;
        debug!(sink = %self.name, seq = chunk.seq, rows, "chunk written");
        Ok(rows)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .await
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .shutdown()
                .await
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        info!(sink = %self.name, lines = self.lines, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DataKind, RecordBuffer};
    use serde_json::Value;
    use tempfile::tempdir;

    fn chunk(seq: u64, tods: &[f64]) -> Chunk {
        let mut buffer = RecordBuffer::with_columns([("tod", DataKind::F64)]).unwrap();
        for tod in tods {
            let row = buffer.push_row();
            buffer.set_value("tod", row, *tod);
        }
        let mut chunk = Chunk::new(seq, false);
        chunk.buffers.insert("plot".into(), buffer);
        chunk
    }

    fn params(path: &std::path::Path) -> HashMap<String, String> {
        HashMap::from([("path".to_string(), path.display().to_string())])
    }

    #[tokio::test]
    async fn test_file_sink_writes_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/plots.jsonl");
        let mut sink = FileSink::from_params("file", &params(&path)).await.unwrap();

        assert_eq!(sink.insert(chunk(0, &[1.0, 2.0])).await.unwrap(), 2);
        assert_eq!(sink.insert(chunk(1, &[3.0])).await.unwrap(), 1);
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "plot");
        assert_eq!(lines[0]["rows"][1]["tod"], 2.0);
        assert_eq!(lines[1]["seq"], 1);
    }

    #[tokio::test]
    async fn test_file_sink_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plots.jsonl");
        std::fs::write(&path, "{}\n").unwrap();

        let mut p = params(&path);
        p.insert("append".into(), "true".into());
        let mut sink = FileSink::from_params("file", &p).await.unwrap();
        sink.insert(chunk(0, &[1.0])).await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_insert_after_close_fails() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::from_params("file", &params(&dir.path().join("x.jsonl")))
            .await
            .unwrap();
        sink.close().await.unwrap();
        let err = sink.insert(chunk(0, &[1.0])).await.unwrap_err();
        assert!(matches!(err, ContractError::SinkWrite { .. }));
    }

    #[test]
    fn test_config_requires_path() {
        assert!(FileSinkConfig::from_params(&HashMap::new()).is_err());
        let bad = HashMap::from([
            ("path".to_string(), "x".to_string()),
            ("append".to_string(), "maybe".to_string()),
        ]);
        assert!(FileSinkConfig::from_params(&bad).is_err());
    }
}
