//! Controller task of one run
//!
//! Every stage completion arrives as an [`Event`] on one channel, so the
//! in-flight count, the reorder buffer, the insert queue and the job set are
//! only touched here. Chunks move between stages by value.
//!
//! Per accepted chunk: one map job on the blocking pool, then one
//! post-process job once every earlier chunk has been post-processed, then
//! the FIFO insert queue. At most one insert runs at a time.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    Chunk, ContractError, DecodeProgress, DecodedChunk, EventCallback, InsertionSink,
    PipelineEvent, RunOutcome,
};
use ingestion::Mapper;
use observability::DropReason;
use postprocess::{PostprocessReport, Postprocessor};
use slab::Slab;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::error::PipelineError;
use crate::metrics::ControllerMetrics;

/// Stage completions and decoder output
pub(crate) enum Event<S> {
    Decoded {
        chunk: DecodedChunk,
        progress: DecodeProgress,
    },
    DecodeFinished(Result<(), ContractError>),
    Mapped {
        job: usize,
        result: Result<Chunk, String>,
    },
    Postprocessed {
        job: usize,
        result: Result<(Postprocessor, Chunk, PostprocessReport), String>,
    },
    Inserted {
        /// `None` if the insert task died with the sink
        sink: Option<S>,
        seq: u64,
        result: Result<usize, String>,
        latency: Duration,
    },
}

/// Requests from the handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Stop,
    Pause,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Map,
    Postprocess,
}

#[derive(Debug)]
struct JobInfo {
    stage: Stage,
    /// Position among accepted chunks
    ticket: u64,
    seq: u64,
    /// Set on shutdown; the completion is discarded
    obsolete: bool,
}

#[derive(Debug)]
enum Shutdown {
    Stopped,
    Failed(PipelineError),
}

/// Fixed parameters of a run
pub(crate) struct RunSettings {
    pub source: String,
    pub live: bool,
    pub max_in_flight: usize,
    pub stall_timeout: Duration,
}

pub(crate) struct Run<S> {
    settings: RunSettings,
    mapper: Arc<Mapper>,
    /// `None` while a post-process job owns it
    postprocessor: Option<Postprocessor>,
    /// `None` while an insert owns it
    sink: Option<S>,
    sink_name: String,
    jobs: Slab<JobInfo>,
    /// Mapped chunks waiting for earlier ones, keyed by ticket
    reorder: BTreeMap<u64, Chunk>,
    next_ticket: u64,
    next_post_ticket: u64,
    insert_queue: VecDeque<Chunk>,
    insert_active: bool,
    in_flight: usize,
    next_seq: u64,
    decode_done: bool,
    paused: bool,
    shutdown: Option<Shutdown>,
    /// Live mode: when the run last went over its in-flight bound
    over_since: Option<Instant>,
    /// File mode in-flight permits shared with the decode task
    permits: Option<Arc<Semaphore>>,
    cancel: watch::Sender<bool>,
    events: mpsc::UnboundedSender<Event<S>>,
    metrics: Arc<ControllerMetrics>,
    callback: Option<EventCallback>,
}

impl<S> Run<S>
where
    S: InsertionSink + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        settings: RunSettings,
        mapper: Arc<Mapper>,
        postprocessor: Postprocessor,
        sink: S,
        permits: Option<Arc<Semaphore>>,
        cancel: watch::Sender<bool>,
        events: mpsc::UnboundedSender<Event<S>>,
        metrics: Arc<ControllerMetrics>,
        callback: Option<EventCallback>,
    ) -> Self {
        let sink_name = sink.name().to_string();
        Self {
            settings,
            mapper,
            postprocessor: Some(postprocessor),
            sink: Some(sink),
            sink_name,
            jobs: Slab::new(),
            reorder: BTreeMap::new(),
            next_ticket: 0,
            next_post_ticket: 0,
            insert_queue: VecDeque::new(),
            insert_active: false,
            in_flight: 0,
            next_seq: 0,
            decode_done: false,
            paused: false,
            shutdown: None,
            over_since: None,
            permits,
            cancel,
            events,
            metrics,
            callback,
        }
    }

    /// Drive the run to completion
    #[instrument(
        name = "pipeline_run",
        skip_all,
        fields(source = %self.settings.source, live = self.settings.live)
    )]
    pub(crate) async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<Event<S>>,
        mut control: mpsc::UnboundedReceiver<Control>,
        mut decode_task: JoinHandle<()>,
    ) -> Result<RunOutcome, PipelineError> {
        info!(
            max_in_flight = self.settings.max_in_flight,
            sink = %self.sink_name,
            "run started"
        );
        self.emit(PipelineEvent::RunStarted {
            source: self.settings.source.clone(),
            live: self.settings.live,
        });

        let mut watchdog = tokio::time::interval(self.watchdog_period());
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut control_open = true;
        let mut decode_joined = false;

        while !self.is_done() {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                command = control.recv(), if control_open => match command {
                    Some(command) => self.handle_control(command),
                    None => {
                        // handle dropped
                        control_open = false;
                        self.begin_shutdown(Shutdown::Stopped);
                    }
                },
                joined = &mut decode_task, if !decode_joined => {
                    decode_joined = true;
                    self.on_decode_joined(joined);
                }
                _ = watchdog.tick(), if self.settings.live => self.check_stall(),
            }
        }

        if !decode_joined {
            if let Err(e) = decode_task.await {
                warn!(error = %e, "decode task did not finish cleanly");
            }
        }
        self.finish().await
    }

    /// A decode task that ends without reporting (panic) fails the run.
    /// A clean exit has already queued its `DecodeFinished`.
    fn on_decode_joined(&mut self, joined: Result<(), tokio::task::JoinError>) {
        let Err(e) = joined else {
            return;
        };
        if self.decode_done {
            warn!(error = %e, "decode task did not finish cleanly");
            return;
        }
        self.handle_event(Event::DecodeFinished(Err(ContractError::decode(
            self.settings.source.clone(),
            format!("decode task died: {e}"),
        ))));
    }

    fn watchdog_period(&self) -> Duration {
        (self.settings.stall_timeout / 4).max(Duration::from_millis(10))
    }

    fn is_done(&self) -> bool {
        if !self.decode_done || !self.jobs.is_empty() || self.insert_active {
            return false;
        }
        self.shutdown.is_some() || self.in_flight == 0
    }

    fn handle_event(&mut self, event: Event<S>) {
        match event {
            Event::Decoded { chunk, progress } => self.on_decoded(chunk, progress),
            Event::DecodeFinished(result) => {
                self.decode_done = true;
                if let Err(e) = result {
                    self.fail(PipelineError::Decode(e.to_string()));
                }
            }
            Event::Mapped { job, result } => self.on_mapped(job, result),
            Event::Postprocessed { job, result } => self.on_postprocessed(job, result),
            Event::Inserted {
                sink,
                seq,
                result,
                latency,
            } => self.on_inserted(sink, seq, result, latency),
        }
    }

    fn handle_control(&mut self, command: Control) {
        match command {
            Control::Stop => {
                info!("stop requested");
                self.begin_shutdown(Shutdown::Stopped);
            }
            Control::Pause if self.settings.live => {
                info!("live run paused, decoded chunks are discarded");
                self.paused = true;
            }
            Control::Resume if self.settings.live => {
                info!("live run resumed");
                self.paused = false;
            }
            Control::Pause | Control::Resume => {}
        }
    }

    fn on_decoded(&mut self, decoded: DecodedChunk, progress: DecodeProgress) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.metrics.inc_decoded();
        observability::record_chunk_decoded(decoded.record_count());

        if self.shutdown.is_some() {
            self.release_permit();
            return;
        }

        self.emit(PipelineEvent::ChunkProgress {
            seq,
            records_per_sec: progress.records_per_sec(),
            fraction: progress.fraction(),
            estimated_remaining: progress.estimated_remaining(),
        });

        if self.settings.live {
            if self.paused {
                self.metrics.inc_paused_discard();
                observability::record_chunk_dropped(DropReason::Paused);
                debug!(seq, records = decoded.record_count(), "run paused, chunk discarded");
                return;
            }
            if self.in_flight >= self.settings.max_in_flight {
                let dropped_total = self.metrics.inc_overload_drop();
                observability::record_chunk_dropped(DropReason::Overload);
                warn!(
                    seq,
                    records = decoded.record_count(),
                    in_flight = self.in_flight,
                    dropped_total,
                    "pipeline overloaded, live chunk dropped"
                );
                self.emit(PipelineEvent::OverloadDrop { seq, dropped_total });
                return;
            }
        }

        self.accept(decoded, seq);
    }

    fn accept(&mut self, decoded: DecodedChunk, seq: u64) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight += 1;
        self.in_flight_changed();
        self.metrics.inc_accepted();

        // keys are reserved here so they follow source order
        let rec_base = self.mapper.reserve(decoded.record_count());
        let job = self.jobs.insert(JobInfo {
            stage: Stage::Map,
            ticket,
            seq,
            obsolete: false,
        });

        let mapper = self.mapper.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::task::spawn_blocking(move || mapper.map(decoded, seq, rec_base))
                .await
                .map_err(|e| format!("map job for chunk {seq} died: {e}"));
            observability::record_stage_latency_ms("map", started.elapsed().as_secs_f64() * 1e3);
            let _ = events.send(Event::Mapped { job, result });
        });
    }

    fn on_mapped(&mut self, job: usize, result: Result<Chunk, String>) {
        let info = self.jobs.remove(job);
        debug_assert_eq!(info.stage, Stage::Map);
        let chunk = match result {
            Ok(chunk) => chunk,
            Err(message) => {
                self.finish_chunk();
                self.fail(PipelineError::Job(message));
                return;
            }
        };
        if info.obsolete {
            self.finish_chunk();
            return;
        }
        self.reorder.insert(info.ticket, chunk);
        self.try_postprocess();
    }

    /// Start the next post-process job if the postprocessor is free and the
    /// next chunk in order is mapped
    fn try_postprocess(&mut self) {
        if self.shutdown.is_some() || self.postprocessor.is_none() {
            return;
        }
        if self.reorder.first_key_value().map(|(ticket, _)| *ticket) != Some(self.next_post_ticket) {
            return;
        }
        let (Some((ticket, mut chunk)), Some(mut postprocessor)) =
            (self.reorder.pop_first(), self.postprocessor.take())
        else {
            return;
        };
        self.next_post_ticket += 1;

        let seq = chunk.seq;
        let job = self.jobs.insert(JobInfo {
            stage: Stage::Postprocess,
            ticket,
            seq,
            obsolete: false,
        });
        let events = self.events.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::task::spawn_blocking(move || {
                let report = postprocessor.process(&mut chunk);
                (postprocessor, chunk, report)
            })
            .await
            .map_err(|e| format!("post-process job for chunk {seq} died: {e}"));
            observability::record_stage_latency_ms(
                "postprocess",
                started.elapsed().as_secs_f64() * 1e3,
            );
            let _ = events.send(Event::Postprocessed { job, result });
        });
    }

    fn on_postprocessed(
        &mut self,
        job: usize,
        result: Result<(Postprocessor, Chunk, PostprocessReport), String>,
    ) {
        let info = self.jobs.remove(job);
        debug_assert_eq!(info.stage, Stage::Postprocess);
        let (postprocessor, chunk, report) = match result {
            Ok(done) => done,
            Err(message) => {
                self.finish_chunk();
                self.fail(PipelineError::Job(message));
                return;
            }
        };
        self.postprocessor = Some(postprocessor);
        if info.obsolete {
            self.finish_chunk();
            return;
        }

        self.metrics.add_future_rows(report.future_rows_truncated);
        observability::record_future_rows_truncated(report.future_rows_truncated);
        observability::record_buffers_dropped("postprocess", report.buffers_removed);
        observability::record_projection(report.rows_projected, report.rows_unprojected);

        if chunk.is_empty() {
            debug!(seq = info.seq, "chunk empty after post-processing, discarded");
            self.metrics.inc_empty();
            self.finish_chunk();
        } else {
            self.insert_queue.push_back(chunk);
            self.start_insert();
        }
        self.try_postprocess();
    }

    fn start_insert(&mut self) {
        if self.insert_active || self.shutdown.is_some() {
            return;
        }
        let Some(mut sink) = self.sink.take() else {
            return;
        };
        let Some(chunk) = self.insert_queue.pop_front() else {
            self.sink = Some(sink);
            return;
        };
        self.insert_active = true;

        let seq = chunk.seq;
        let events = self.events.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let insert = tokio::spawn(async move {
                let result = sink.insert(chunk).await;
                (sink, result)
            });
            let event = match insert.await {
                Ok((sink, result)) => Event::Inserted {
                    sink: Some(sink),
                    seq,
                    result: result.map_err(|e| e.to_string()),
                    latency: started.elapsed(),
                },
                Err(e) => Event::Inserted {
                    sink: None,
                    seq,
                    result: Err(format!("insert task for chunk {seq} died: {e}")),
                    latency: started.elapsed(),
                },
            };
            let _ = events.send(event);
        });
    }

    fn on_inserted(
        &mut self,
        sink: Option<S>,
        seq: u64,
        result: Result<usize, String>,
        latency: Duration,
    ) {
        self.insert_active = false;
        if sink.is_some() {
            self.sink = sink;
        }
        self.finish_chunk();

        match result {
            Ok(rows) => {
                let latency_ms = latency.as_secs_f64() * 1e3;
                self.metrics.record_insert(rows);
                observability::record_chunk_inserted(&self.sink_name, rows, latency_ms);
                debug!(seq, rows, latency_ms, "chunk inserted");
                self.emit(PipelineEvent::ChunkInserted { seq, rows, latency });
                self.start_insert();
            }
            Err(message) => {
                observability::record_insert_failure(&self.sink_name);
                self.fail(PipelineError::Insert(message));
            }
        }
    }

    /// Live watchdog: when the run has stayed over its bound for the stall
    /// timeout with chunks queued, drain one queued chunk into the sink.
    /// Queued chunks are never discarded; a slow active insert is only
    /// reported.
    fn check_stall(&mut self) {
        if self.shutdown.is_some() || self.insert_queue.is_empty() {
            return;
        }
        let Some(since) = self.over_since else {
            return;
        };
        if since.elapsed() < self.settings.stall_timeout {
            return;
        }

        if self.insert_active {
            warn!(
                queued = self.insert_queue.len(),
                in_flight = self.in_flight,
                stalled_ms = since.elapsed().as_millis() as u64,
                "insert stalled over threshold"
            );
        } else {
            self.metrics.inc_watchdog_drain();
            warn!(queued = self.insert_queue.len(), "pipeline stalled, draining one insert");
            self.start_insert();
        }
        self.over_since = Some(Instant::now());
    }

    fn fail(&mut self, err: PipelineError) {
        error!(error = %err, "run failed");
        self.begin_shutdown(Shutdown::Failed(err));
    }

    /// Cancel decoding, mark running jobs obsolete and discard queued chunks.
    ///
    /// The first reason wins; the run ends once every job and the active
    /// insert have completed.
    fn begin_shutdown(&mut self, reason: Shutdown) {
        if self.shutdown.is_some() {
            return;
        }
        let _ = self.cancel.send(true);
        for (_, job) in self.jobs.iter_mut() {
            job.obsolete = true;
        }
        let discarded = self.reorder.len() + self.insert_queue.len();
        self.reorder.clear();
        self.insert_queue.clear();
        for _ in 0..discarded {
            self.finish_chunk();
        }
        info!(
            discarded,
            jobs = self.jobs.len(),
            insert_active = self.insert_active,
            "run shutting down"
        );
        self.shutdown = Some(reason);
    }

    /// A chunk left the pipeline (inserted, emptied or discarded)
    fn finish_chunk(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.release_permit();
        self.in_flight_changed();
    }

    fn release_permit(&self) {
        if let Some(permits) = &self.permits {
            permits.add_permits(1);
        }
    }

    fn in_flight_changed(&mut self) {
        self.metrics.set_in_flight(self.in_flight);
        observability::record_in_flight(self.in_flight);
        if self.in_flight >= self.settings.max_in_flight {
            self.over_since.get_or_insert_with(Instant::now);
        } else {
            self.over_since = None;
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    async fn finish(mut self) -> Result<RunOutcome, PipelineError> {
        debug_assert_eq!(self.in_flight, 0, "chunks left in flight at run end");
        let shutdown = self.shutdown.take();
        let stopped = matches!(shutdown, Some(Shutdown::Stopped));
        let mut failure = match shutdown {
            Some(Shutdown::Failed(err)) => Some(err),
            _ => None,
        };

        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.flush().await {
                warn!(sink = %self.sink_name, error = %e, "flushing sink failed");
            }
            if let Err(e) = sink.close().await {
                error!(sink = %self.sink_name, error = %e, "closing sink failed");
                failure.get_or_insert(PipelineError::Insert(e.to_string()));
            }
        }

        let snapshot = self.metrics.snapshot();
        let result = match failure {
            Some(err) => Err(err),
            None if stopped => Ok(RunOutcome::Stopped),
            None => Ok(RunOutcome::Completed {
                chunks_inserted: snapshot.chunks_inserted,
                rows_inserted: snapshot.rows_inserted,
            }),
        };

        info!(
            chunks_decoded = snapshot.chunks_decoded,
            chunks_inserted = snapshot.chunks_inserted,
            rows_inserted = snapshot.rows_inserted,
            overload_drops = snapshot.overload_drops,
            paused_discards = snapshot.paused_discards,
            outcome = ?result,
            "run finished"
        );
        self.emit(PipelineEvent::RunFinished(match &result {
            Ok(outcome) => outcome.clone(),
            Err(err) => RunOutcome::Failed {
                message: err.to_string(),
            },
        }));
        result
    }
}
