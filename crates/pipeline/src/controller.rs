//! Pipeline controller handle

use std::sync::Arc;
use std::time::Duration;

use contracts::{Decoder, EventCallback, InsertionSink, RunConfig, RunOutcome};
use ingestion::{Mapper, SourceDecoder};
use postprocess::{Postprocessor, SharedClock, SystemClock};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::decode::decode_loop;
use crate::error::PipelineError;
use crate::metrics::ControllerMetrics;
use crate::run::{Control, Run, RunSettings};

struct ActiveRun {
    live: bool,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<Result<RunOutcome, PipelineError>>,
}

/// Runs decode → map → post-process → insert for one source at a time.
///
/// `start` spawns the run and returns immediately; progress is reported
/// through the event callback and the outcome through [`wait`](Self::wait)
/// or [`stop`](Self::stop). Dropping the controller stops an active run.
pub struct PipelineController {
    config: Arc<RunConfig>,
    clock: SharedClock,
    callback: Option<EventCallback>,
    metrics: Arc<ControllerMetrics>,
    run: Option<ActiveRun>,
}

impl PipelineController {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
            callback: None,
            metrics: Arc::new(ControllerMetrics::new()),
            run: None,
        }
    }

    /// Replace the wall clock used by post-processing
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Counters of the current (or last) run
    pub fn metrics(&self) -> Arc<ControllerMetrics> {
        self.metrics.clone()
    }

    pub fn is_running(&self) -> bool {
        self.active().is_some()
    }

    /// Whether the active run reads a live source
    pub fn is_live(&self) -> Option<bool> {
        self.active().map(|run| run.live)
    }

    fn active(&self) -> Option<&ActiveRun> {
        self.run.as_ref().filter(|run| !run.task.is_finished())
    }

    /// Start a run reading from `decoder` into `sink`.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(
        name = "pipeline_start",
        skip(self, decoder, sink),
        fields(decoder = %decoder.name(), sink = %sink.name())
    )]
    pub fn start<D, S>(&mut self, decoder: D, sink: S) -> Result<(), PipelineError>
    where
        D: Decoder + 'static,
        S: InsertionSink + 'static,
    {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }

        let live = decoder.is_live();
        let backpressure = &self.config.backpressure;
        let settings = RunSettings {
            source: decoder.name().to_string(),
            live,
            max_in_flight: if live {
                backpressure.live_max_in_flight
            } else {
                backpressure.file_max_in_flight
            }
            .max(1),
            stall_timeout: Duration::from_millis(backpressure.live_stall_timeout_ms),
        };
        let mapper = Arc::new(Mapper::from_config(&self.config)?);
        let postprocessor = Postprocessor::for_mode(&self.config, live, self.clock.clone());

        self.metrics = Arc::new(ControllerMetrics::new());
        let permits = (!live).then(|| Arc::new(Semaphore::new(settings.max_in_flight)));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        info!(
            source = %settings.source,
            live,
            max_in_flight = settings.max_in_flight,
            "starting run"
        );

        let decode_task = tokio::spawn(decode_loop(
            decoder,
            events_tx.clone(),
            cancel_rx,
            permits.clone(),
            self.metrics.clone(),
        ));
        let run = Run::new(
            settings,
            mapper,
            postprocessor,
            sink,
            permits,
            cancel_tx,
            events_tx,
            self.metrics.clone(),
            self.callback.clone(),
        );
        let task = tokio::spawn(run.run(events_rx, control_rx, decode_task));

        self.run = Some(ActiveRun {
            live,
            control: control_tx,
            task,
        });
        Ok(())
    }

    /// Open the configured source and start a run into `sink`
    pub async fn start_configured<S>(&mut self, sink: S) -> Result<(), PipelineError>
    where
        S: InsertionSink + 'static,
    {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }
        let decoder = SourceDecoder::open(&self.config.source).await?;
        self.start(decoder, sink)
    }

    /// Pause a live run; decoded chunks are discarded until resumed
    pub fn pause(&self) -> Result<(), PipelineError> {
        self.send_live(Control::Pause)
    }

    pub fn resume(&self) -> Result<(), PipelineError> {
        self.send_live(Control::Resume)
    }

    fn send_live(&self, command: Control) -> Result<(), PipelineError> {
        let run = self.active().ok_or(PipelineError::NotRunning)?;
        if !run.live {
            return Err(PipelineError::NotLive);
        }
        run.control
            .send(command)
            .map_err(|_| PipelineError::Stopped)
    }

    /// Stop the run and wait until every job and the active insert have
    /// completed. Queued chunks are discarded.
    pub async fn stop(&mut self) -> Result<RunOutcome, PipelineError> {
        let run = self.run.as_ref().ok_or(PipelineError::NotRunning)?;
        // the run may already have ended on its own
        let _ = run.control.send(Control::Stop);
        self.wait().await
    }

    /// Leave live mode; same as [`stop`](Self::stop)
    pub async fn go_offline(&mut self) -> Result<RunOutcome, PipelineError> {
        self.stop().await
    }

    /// Wait for the run to end.
    ///
    /// Cancel safe: dropping the future leaves the run attached, so a
    /// later `stop` still reaches it.
    pub async fn wait(&mut self) -> Result<RunOutcome, PipelineError> {
        let run = self.run.as_mut().ok_or(PipelineError::NotRunning)?;
        let joined = (&mut run.task).await;
        self.run = None;
        joined.map_err(|e| PipelineError::Job(format!("controller task died: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use contracts::{
        columns, ContractError, DecodeProgress, DecodedChunk, PipelineEvent, TaggedTree,
    };
    use insertion::{MemorySink, MemorySinkHandle};
    use serde_json::{json, Value};

    /// Decoder replaying prepared chunks
    struct ScriptedDecoder {
        chunks: VecDeque<DecodedChunk>,
        live: bool,
        delay: Option<Duration>,
        fail_at: Option<usize>,
        panic_at: Option<usize>,
        produced: usize,
    }

    impl ScriptedDecoder {
        fn new(chunks: Vec<DecodedChunk>, live: bool) -> Self {
            Self {
                chunks: chunks.into(),
                live,
                delay: None,
                fail_at: None,
                panic_at: None,
                produced: 0,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn failing_at(mut self, index: usize) -> Self {
            self.fail_at = Some(index);
            self
        }

        fn panicking_at(mut self, index: usize) -> Self {
            self.panic_at = Some(index);
            self
        }
    }

    impl Decoder for ScriptedDecoder {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_live(&self) -> bool {
            self.live
        }

        async fn next_chunk(&mut self) -> Result<Option<DecodedChunk>, ContractError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_at == Some(self.produced) {
                return Err(ContractError::decode("scripted", "bad frame"));
            }
            if self.panic_at == Some(self.produced) {
                panic!("scripted decoder blew up");
            }
            match self.chunks.pop_front() {
                Some(chunk) => {
                    self.produced += 1;
                    Ok(Some(chunk))
                }
                // a live feed never ends on its own
                None if self.live => std::future::pending().await,
                None => Ok(None),
            }
        }

        fn progress(&self) -> DecodeProgress {
            DecodeProgress {
                records_consumed: self.produced as u64,
                ..Default::default()
            }
        }
    }

    fn config(live: bool) -> RunConfig {
        let source = if live {
            json!({"type": "live", "endpoints": [{"sensor": "psr_north", "bind": "127.0.0.1:0"}]})
        } else {
            json!({"type": "file", "path": "replay.jsonl"})
        };
        serde_json::from_value(json!({
            "source": source,
            "backpressure": {
                "file_max_in_flight": 2,
                "live_max_in_flight": 2,
                "live_stall_timeout_ms": 100
            },
            "postprocess": {"start_date": "2024-06-01", "future_check": false},
            "record_kinds": [{
                "name": "plot",
                "tod_path": "tod",
                "columns": [{"path": "value", "column": "value", "kind": "i64"}]
            }]
        }))
        .unwrap()
    }

    fn decoded(first_tod: usize, count: usize, is_last: bool) -> DecodedChunk {
        let records: Vec<Value> = (first_tod..first_tod + count)
            .map(|i| json!({"tod": 3600.0 + i as f64, "value": i}))
            .collect();
        DecodedChunk {
            trees: vec![TaggedTree::new("plot", records)],
            is_last,
        }
    }

    fn script(chunks: usize, per_chunk: usize) -> Vec<DecodedChunk> {
        (0..chunks)
            .map(|i| decoded(i * per_chunk, per_chunk, i + 1 == chunks))
            .collect()
    }

    fn recorder() -> (EventCallback, Arc<Mutex<Vec<PipelineEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: EventCallback = Arc::new(move |event| sink.lock().unwrap().push(event));
        (callback, events)
    }

    fn memory_sink(delay_ms: u64) -> (MemorySink, MemorySinkHandle) {
        let (sink, handle) = MemorySink::new("memory");
        (sink.with_delay(Duration::from_millis(delay_ms)), handle)
    }

    #[tokio::test]
    async fn test_file_run_inserts_in_source_order() {
        let (callback, events) = recorder();
        let mut controller = PipelineController::new(config(false)).with_event_callback(callback);
        let (sink, handle) = memory_sink(20);

        controller
            .start(ScriptedDecoder::new(script(6, 3), false), sink)
            .unwrap();
        let outcome = controller.wait().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Completed {
                chunks_inserted: 6,
                rows_inserted: 18
            }
        );
        assert_eq!(handle.seqs(), vec![0, 1, 2, 3, 4, 5]);
        assert!(handle.is_closed());

        let rec_nums: Vec<u64> = handle.with_chunks(|chunks| {
            chunks
                .iter()
                .flat_map(|chunk| {
                    let buffer = &chunk.buffers["plot"];
                    let column = buffer.column_ref::<u64>(columns::REC_NUM);
                    (0..buffer.row_count())
                        .map(|row| *column.get(row).unwrap())
                        .collect::<Vec<_>>()
                })
                .collect()
        });
        assert_eq!(rec_nums, (0..18).collect::<Vec<u64>>());

        let snapshot = controller.metrics().snapshot();
        assert!(snapshot.peak_in_flight <= 2);
        assert!(snapshot.decoder_pauses >= 1);
        assert_eq!(snapshot.in_flight, 0);

        let events = events.lock().unwrap();
        assert!(matches!(events.first(), Some(PipelineEvent::RunStarted { live: false, .. })));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::RunFinished(RunOutcome::Completed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_timestamps_written() {
        let mut controller = PipelineController::new(config(false));
        let (sink, handle) = memory_sink(0);
        controller
            .start(ScriptedDecoder::new(script(1, 2), false), sink)
            .unwrap();
        controller.wait().await.unwrap();

        let first = handle.with_chunks(|chunks| {
            chunks[0].buffers["plot"]
                .column_ref::<i64>(columns::TIMESTAMP)
                .get(0)
                .copied()
        });
        // 2024-06-01T01:00:00Z
        assert_eq!(first, Some(1_717_203_600_000));
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let mut controller = PipelineController::new(config(true));
        let (sink, _handle) = memory_sink(0);
        controller
            .start(ScriptedDecoder::new(Vec::new(), true), sink)
            .unwrap();

        let (second, _) = memory_sink(0);
        let err = controller
            .start(ScriptedDecoder::new(Vec::new(), true), second)
            .unwrap_err();
        assert_eq!(err, PipelineError::AlreadyRunning);

        assert_eq!(controller.stop().await.unwrap(), RunOutcome::Stopped);
        assert!(!controller.is_running());
        assert_eq!(controller.stop().await.unwrap_err(), PipelineError::NotRunning);
    }

    #[tokio::test]
    async fn test_file_run_rejects_pause() {
        let mut controller = PipelineController::new(config(false));
        let (sink, _handle) = memory_sink(50);
        controller
            .start(ScriptedDecoder::new(script(4, 1), false), sink)
            .unwrap();
        assert_eq!(controller.pause().unwrap_err(), PipelineError::NotLive);
        controller.stop().await.unwrap();
        assert_eq!(controller.pause().unwrap_err(), PipelineError::NotRunning);
    }

    #[tokio::test]
    async fn test_live_overload_drops_chunks() {
        let (callback, events) = recorder();
        let mut controller = PipelineController::new(config(true)).with_event_callback(callback);
        let (sink, _handle) = memory_sink(200);

        controller
            .start(ScriptedDecoder::new(script(10, 1), true), sink)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(controller.stop().await.unwrap(), RunOutcome::Stopped);

        let snapshot = controller.metrics().snapshot();
        assert!(snapshot.overload_drops >= 1);
        assert!(snapshot.peak_in_flight <= 2);
        assert_eq!(snapshot.in_flight, 0);
        assert_eq!(snapshot.chunks_decoded, 10);

        let drops = events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| matches!(event, PipelineEvent::OverloadDrop { .. }))
            .count() as u64;
        assert_eq!(drops, snapshot.overload_drops);
    }

    #[tokio::test]
    async fn test_live_stall_keeps_queued_chunks() {
        let mut controller = PipelineController::new(config(true));
        let (sink, handle) = memory_sink(300);

        controller
            .start(
                ScriptedDecoder::new(script(60, 1), true).with_delay(Duration::from_millis(10)),
                sink,
            )
            .unwrap();
        // the first insert outlives the stall timeout several times over
        tokio::time::sleep(Duration::from_millis(700)).await;
        controller.stop().await.unwrap();

        let seqs = handle.seqs();
        assert!(seqs.len() >= 2);
        assert_eq!(&seqs[..2], &[0, 1]);

        let snapshot = controller.metrics().snapshot();
        assert_eq!(snapshot.watchdog_drains, 0);
        // only freshly decoded chunks were dropped, never accepted ones
        assert!(snapshot.overload_drops <= snapshot.chunks_decoded - snapshot.chunks_accepted);
        assert_eq!(snapshot.in_flight, 0);
    }

    #[tokio::test]
    async fn test_live_pause_discards_until_resume() {
        let mut controller = PipelineController::new(config(true));
        let (sink, handle) = memory_sink(0);

        controller
            .start(
                ScriptedDecoder::new(script(30, 1), true).with_delay(Duration::from_millis(10)),
                sink,
            )
            .unwrap();
        controller.pause().unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(controller.metrics().snapshot().paused_discards >= 1);
        assert_eq!(handle.chunk_count(), 0);

        controller.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(controller.go_offline().await.unwrap(), RunOutcome::Stopped);
        assert!(handle.chunk_count() >= 1);
    }

    #[tokio::test]
    async fn test_stop_waits_for_active_insert() {
        let mut controller = PipelineController::new(config(false));
        let (sink, handle) = memory_sink(150);

        controller
            .start(ScriptedDecoder::new(script(10, 5), false), sink)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(controller.stop().await.unwrap(), RunOutcome::Stopped);

        // the insert running at stop time completed, queued chunks were discarded
        assert_eq!(handle.seqs(), vec![0]);
        assert!(handle.is_closed());
        assert_eq!(controller.metrics().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_is_fatal() {
        let (callback, events) = recorder();
        let mut controller = PipelineController::new(config(false)).with_event_callback(callback);
        let (sink, _handle) = memory_sink(0);

        controller
            .start(ScriptedDecoder::new(script(5, 1), false).failing_at(2), sink)
            .unwrap();
        let err = controller.wait().await.unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert!(matches!(
            events.lock().unwrap().last(),
            Some(PipelineEvent::RunFinished(RunOutcome::Failed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_decoder_panic_fails_run() {
        let mut controller = PipelineController::new(config(false));
        let (sink, handle) = memory_sink(0);

        controller
            .start(ScriptedDecoder::new(script(5, 1), false).panicking_at(2), sink)
            .unwrap();
        let err = tokio::time::timeout(Duration::from_secs(2), controller.wait())
            .await
            .expect("run ended")
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
        assert!(handle.is_closed());
        assert_eq!(controller.metrics().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_stop_returns_after_live_decoder_panic() {
        let mut controller = PipelineController::new(config(true));
        let (sink, _handle) = memory_sink(0);

        controller
            .start(ScriptedDecoder::new(Vec::new(), true).panicking_at(0), sink)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = tokio::time::timeout(Duration::from_secs(2), controller.stop())
            .await
            .expect("stop returned");
        assert!(matches!(result, Err(PipelineError::Decode(_))));
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn test_insert_failure_is_fatal() {
        let mut controller = PipelineController::new(config(false));
        let (sink, handle) = MemorySink::new("memory");

        controller
            .start(ScriptedDecoder::new(script(5, 1), false), sink.fail_on(1))
            .unwrap();
        let err = controller.wait().await.unwrap_err();
        assert!(matches!(err, PipelineError::Insert(_)));
        assert_eq!(handle.seqs(), vec![0]);
        assert_eq!(controller.metrics().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_empty_chunks_not_inserted() {
        let mut controller = PipelineController::new(config(false));
        let (sink, handle) = memory_sink(0);
        let unknown = DecodedChunk {
            trees: vec![TaggedTree::new("weather", vec![json!({"tod": 1.0})])],
            is_last: true,
        };

        controller
            .start(ScriptedDecoder::new(vec![unknown], false), sink)
            .unwrap();
        let outcome = controller.wait().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Completed {
                chunks_inserted: 0,
                rows_inserted: 0
            }
        );
        assert_eq!(handle.chunk_count(), 0);
        assert_eq!(controller.metrics().snapshot().empty_chunks, 1);
    }
}
