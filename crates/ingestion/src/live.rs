//! Live network decoder
//!
//! One UDP socket per endpoint feeds a shared channel; the decoder drains it
//! and cuts a chunk every `chunk_interval_ms`. Garbage on a live feed is
//! counted and logged, never fatal.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_channel::{bounded, Receiver, Sender, TrySendError};
use bytes::Bytes;
use contracts::{
    columns, ContractError, DecodeProgress, DecodedChunk, Decoder, LiveEndpoint,
    LiveSourceConfig, SensorId,
};
use metrics::counter;
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::error::{IngestionError, Result};
use crate::frame::{split_frame, stamp, TreeAccumulator};
use crate::metrics::DecoderMetrics;

/// Datagrams buffered between the sockets and the decoder
const DATAGRAM_QUEUE: usize = 4096;

/// One received datagram
#[derive(Debug, Clone)]
struct Datagram {
    sensor: SensorId,
    payload: Bytes,
}

/// Decoder capturing live UDP feeds
pub struct LiveDecoder {
    name: String,
    rx: Receiver<Datagram>,
    receivers: Vec<JoinHandle<()>>,
    ticker: Interval,
    accumulator: TreeAccumulator,
    sensors: Vec<SensorId>,
    local_addrs: Vec<SocketAddr>,
    bytes_consumed: u64,
    records_consumed: u64,
    started: Instant,
    metrics: Arc<DecoderMetrics>,
}

impl LiveDecoder {
    /// Bind every selected endpoint and start receiving
    #[instrument(name = "live_decoder_bind", skip(config), fields(endpoints = config.endpoints.len()))]
    pub async fn bind(config: &LiveSourceConfig) -> std::result::Result<Self, ContractError> {
        let name = format!("live:{}", config.endpoints.len());
        Self::bind_inner(config)
            .await
            .map_err(|e| e.into_contract(&name))
    }

    async fn bind_inner(config: &LiveSourceConfig) -> Result<Self> {
        let endpoints = select_lines(&config.endpoints, config.max_capture_lines);
        if endpoints.is_empty() {
            return Err(IngestionError::NoEndpoints);
        }

        let metrics = Arc::new(DecoderMetrics::new());
        let (tx, rx) = bounded(DATAGRAM_QUEUE);
        let mut receivers = Vec::with_capacity(endpoints.len());
        let mut sensors = Vec::with_capacity(endpoints.len());
        let mut local_addrs = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            let socket = UdpSocket::bind(endpoint.bind)
                .await
                .map_err(|source| IngestionError::Bind {
                    sensor: endpoint.sensor.to_string(),
                    addr: endpoint.bind,
                    source,
                })?;
            let local = socket.local_addr()?;
            info!(
                sensor = %endpoint.sensor,
                addr = %local,
                line = endpoint.line,
                "live endpoint bound"
            );
            sensors.push(endpoint.sensor.clone());
            local_addrs.push(local);
            receivers.push(tokio::spawn(receive_loop(
                socket,
                endpoint.sensor.clone(),
                config.max_datagram_bytes,
                tx.clone(),
                metrics.clone(),
            )));
        }

        let mut ticker = interval(Duration::from_millis(config.chunk_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.reset();

        Ok(Self {
            name: format!(
                "live:{}",
                sensors
                    .iter()
                    .map(SensorId::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            rx,
            receivers,
            ticker,
            accumulator: TreeAccumulator::default(),
            sensors,
            local_addrs,
            bytes_consumed: 0,
            records_consumed: 0,
            started: Instant::now(),
            metrics,
        })
    }

    /// Sensors being captured
    pub fn sensors(&self) -> &[SensorId] {
        &self.sensors
    }

    /// Bound socket addresses, in the order of [`sensors`](Self::sensors)
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn metrics(&self) -> Arc<DecoderMetrics> {
        self.metrics.clone()
    }

    fn ingest(&mut self, datagram: Datagram) {
        self.bytes_consumed += datagram.payload.len() as u64;
        match decode_datagram(&datagram) {
            Ok(frames) => {
                for (kind, records) in frames {
                    self.records_consumed += records.len() as u64;
                    self.accumulator.push(kind, records);
                }
            }
            Err(message) => {
                self.metrics.record_rejected();
                counter!("trackfeed_datagrams_rejected_total", "sensor_id" => datagram.sensor.to_string())
                    .increment(1);
                warn!(
                    sensor = %datagram.sensor,
                    bytes = datagram.payload.len(),
                    error = %message,
                    "rejected datagram"
                );
            }
        }
    }

    fn cut(&mut self) -> DecodedChunk {
        let chunk = self.accumulator.take(false);
        self.metrics.record_records(chunk.record_count());
        self.metrics.record_chunk();
        debug!(
            decoder = %self.name,
            records = chunk.record_count(),
            kinds = chunk.trees.len(),
            "cut live chunk"
        );
        chunk
    }
}

impl Decoder for LiveDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_live(&self) -> bool {
        true
    }

    async fn next_chunk(&mut self) -> std::result::Result<Option<DecodedChunk>, ContractError> {
        loop {
            tokio::select! {
                _ = self.ticker.tick() => {
                    if !self.accumulator.is_empty() {
                        return Ok(Some(self.cut()));
                    }
                }
                received = self.rx.recv() => match received {
                    Ok(datagram) => self.ingest(datagram),
                    Err(_) => {
                        return Err(ContractError::decode(
                            self.name.clone(),
                            "all live endpoints stopped receiving",
                        ));
                    }
                },
            }
        }
    }

    fn progress(&self) -> DecodeProgress {
        DecodeProgress {
            bytes_consumed: self.bytes_consumed,
            bytes_total: None,
            records_consumed: self.records_consumed,
            elapsed: self.started.elapsed(),
        }
    }
}

impl Drop for LiveDecoder {
    fn drop(&mut self) {
        for receiver in &self.receivers {
            receiver.abort();
        }
    }
}

/// Keep endpoints on the first `max_lines` distinct capture lines
fn select_lines(endpoints: &[LiveEndpoint], max_lines: usize) -> Vec<&LiveEndpoint> {
    let lines: BTreeSet<u8> = endpoints.iter().map(|e| e.line).collect();
    let allowed: BTreeSet<u8> = lines.into_iter().take(max_lines).collect();

    endpoints
        .iter()
        .filter(|endpoint| {
            let keep = allowed.contains(&endpoint.line);
            if !keep {
                warn!(
                    sensor = %endpoint.sensor,
                    line = endpoint.line,
                    max_lines,
                    "capture line limit reached, endpoint skipped"
                );
            }
            keep
        })
        .collect()
}

/// Parse one datagram: a frame object or an array of frames.
///
/// Every record gets the originating sensor stamped as `sensor_id`.
fn decode_datagram(datagram: &Datagram) -> std::result::Result<Vec<(String, Vec<Value>)>, String> {
    let value: Value = serde_json::from_slice(&datagram.payload).map_err(|e| e.to_string())?;
    let frames = match value {
        Value::Array(frames) => frames,
        frame => vec![frame],
    };

    frames
        .into_iter()
        .map(|frame| {
            let (kind, mut records) = split_frame(frame)?;
            stamp(&mut records, columns::SENSOR_ID, datagram.sensor.as_str());
            Ok((kind, records))
        })
        .collect()
}

async fn receive_loop(
    socket: UdpSocket,
    sensor: SensorId,
    max_datagram_bytes: usize,
    tx: Sender<Datagram>,
    metrics: Arc<DecoderMetrics>,
) {
    let mut buf = vec![0u8; max_datagram_bytes];
    loop {
        let received = match socket.recv_from(&mut buf).await {
            Ok((len, _peer)) => len,
            Err(e) => {
                warn!(sensor = %sensor, error = %e, "udp receive failed");
                continue;
            }
        };
        metrics.record_datagram();

        let datagram = Datagram {
            sensor: sensor.clone(),
            payload: Bytes::copy_from_slice(&buf[..received]),
        };
        match tx.try_send(datagram) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics.record_dropped();
                debug!(sensor = %sensor, "datagram queue full, dropping");
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
}
