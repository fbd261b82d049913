//! Decode task
//!
//! Pulls chunks from the decoder and forwards them to the controller. In
//! file mode every chunk first takes an in-flight permit, so the decoder
//! pauses while the pipeline is full; live decoders are never paused.

use std::sync::Arc;

use contracts::Decoder;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, instrument};

use crate::metrics::ControllerMetrics;
use crate::run::Event;

/// Resolves once `cancel` holds `true` or the controller is gone
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        let stop = *cancel.borrow_and_update();
        if stop || cancel.changed().await.is_err() {
            return;
        }
    }
}

#[instrument(name = "pipeline_decode", skip_all, fields(decoder = %decoder.name()))]
pub(crate) async fn decode_loop<D, S>(
    mut decoder: D,
    events: mpsc::UnboundedSender<Event<S>>,
    mut cancel: watch::Receiver<bool>,
    permits: Option<Arc<Semaphore>>,
    metrics: Arc<ControllerMetrics>,
) where
    D: Decoder,
{
    loop {
        if let Some(permits) = &permits {
            if permits.available_permits() == 0 {
                metrics.inc_decoder_pause();
                debug!("in-flight bound reached, decoder paused");
            }
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break,
                permit = permits.acquire() => match permit {
                    // returned by the controller when the chunk leaves the pipeline
                    Ok(permit) => permit.forget(),
                    Err(_) => break,
                },
            }
        }

        let next = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            next = decoder.next_chunk() => next,
        };

        match next {
            Ok(Some(chunk)) => {
                let last = chunk.is_last;
                let progress = decoder.progress();
                if events.send(Event::Decoded { chunk, progress }).is_err() {
                    return;
                }
                if last {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = events.send(Event::DecodeFinished(Err(e)));
                return;
            }
        }
    }
    debug!("decode task finished");
    let _ = events.send(Event::DecodeFinished(Ok(())));
}
