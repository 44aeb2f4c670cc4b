//! Background session loading.
//!
//! The pipeline is CPU-bound and runs on the blocking pool (rayon inside);
//! the cooperative runtime only ever awaits its completion. Progress
//! callbacks from the workers are posted into an unbounded queue and
//! drained by a cooperative pump task — subscriber dispatch always happens
//! on the cooperative side, never on a worker thread.

use bytes::Bytes;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use replay_core::{CodecResult, Frame, LoadingState, SessionKey, encode_frame};
use replay_pipeline::{PipelineResult, ProcessedSession, SessionSource, run_pipeline};

use crate::cache::FrameCache;
use crate::session::Session;

/// Opens a telemetry source for one session key. The binary wires a
/// fixture-backed implementation; tests substitute synthetic ones.
pub trait SessionProvider: Send + Sync + 'static {
    fn open(&self, key: SessionKey) -> PipelineResult<Box<dyn SessionSource>>;
}

/// Load tuning knobs, shared across sessions.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Server-side wall-clock bound on one load.
    pub timeout: Duration,
    /// Frame sequences up to this size are pre-encoded at load time.
    pub preencode_limit: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            preencode_limit: 50_000,
        }
    }
}

/// Encode every frame to its binary wire payload, in parallel.
pub fn encode_all_frames(frames: &[Frame]) -> CodecResult<Vec<Bytes>> {
    frames
        .par_iter()
        .enumerate()
        .map(|(i, frame)| encode_frame(i as u32, frame).map(Bytes::from))
        .collect()
}

/// Schedule the load for `session` exactly once; later calls are no-ops.
pub fn schedule_load(
    session: &Arc<Session>,
    provider: Arc<dyn SessionProvider>,
    cache: Arc<FrameCache>,
    options: LoadOptions,
) {
    if !session.begin_load() {
        return;
    }

    let session = Arc::clone(session);
    tokio::spawn(async move {
        run_load(session, provider, cache, options).await;
    });
}

async fn run_load(
    session: Arc<Session>,
    provider: Arc<dyn SessionProvider>,
    cache: Arc<FrameCache>,
    options: LoadOptions,
) {
    let key = session.key();
    session.emit_progress(
        Some(LoadingState::Loading),
        Some(0),
        Some("Starting telemetry load"),
    );

    // Cache first: a hit skips the pipeline entirely.
    let cached = {
        let cache = Arc::clone(&cache);
        tokio::task::spawn_blocking(move || cache.load(key)).await
    };
    match cached {
        Ok(Ok(Some(processed))) => {
            info!(key = %key, "Serving session from cache");
            finish_ready(&session, Arc::new(processed), &options).await;
            return;
        }
        Ok(Ok(None)) => {}
        Ok(Err(error)) => warn!(key = %key, error = %error, "Cache probe failed"),
        Err(error) => warn!(key = %key, error = %error, "Cache probe task failed"),
    }

    // Bridge: workers post progress into the queue, this task fans out.
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<(u8, String)>();
    let pump = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            while let Some((progress, message)) = progress_rx.recv().await {
                session.emit_progress(None, Some(progress), Some(&message));
            }
        })
    };

    let pipeline = tokio::task::spawn_blocking(move || {
        let source = provider.open(key)?;
        let sink = move |progress: u8, message: &str| {
            let _ = progress_tx.send((progress, message.to_string()));
        };
        run_pipeline(source.as_ref(), key, &sink)
    });

    let outcome = tokio::time::timeout(options.timeout, pipeline).await;
    match &outcome {
        // On timeout the abandoned worker still holds its queue sender,
        // so the pump would never drain on its own.
        Err(_) => pump.abort(),
        Ok(_) => {
            let _ = pump.await;
        }
    }

    let processed = match outcome {
        Err(_) => {
            warn!(key = %key, timeout_secs = options.timeout.as_secs(), "Load timed out");
            session.mark_error(format!(
                "Load failed: timed out after {}s",
                options.timeout.as_secs()
            ));
            return;
        }
        Ok(Err(join_error)) => {
            warn!(key = %key, error = %join_error, "Load worker failed");
            session.mark_error("Load failed: worker crashed".to_string());
            return;
        }
        Ok(Ok(Err(error))) => {
            warn!(key = %key, error = %error, "Pipeline failed");
            session.mark_error(format!("Load failed: {error}"));
            return;
        }
        Ok(Ok(Ok(processed))) => Arc::new(processed),
    };

    {
        let cache = Arc::clone(&cache);
        let processed = Arc::clone(&processed);
        let stored =
            tokio::task::spawn_blocking(move || cache.store(key, processed.as_ref())).await;
        match stored {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(key = %key, error = %error, "Cache write failed"),
            Err(error) => warn!(key = %key, error = %error, "Cache write task failed"),
        }
    }

    finish_ready(&session, processed, &options).await;
}

async fn finish_ready(session: &Arc<Session>, data: Arc<ProcessedSession>, options: &LoadOptions) {
    let encoded = match data.frames() {
        Some(frames) if !frames.is_empty() && frames.len() <= options.preencode_limit => {
            let data = Arc::clone(&data);
            let result = tokio::task::spawn_blocking(move || {
                encode_all_frames(data.frames().unwrap_or_default())
            })
            .await;
            match result {
                Ok(Ok(payloads)) => Some(Arc::new(payloads)),
                Ok(Err(error)) => {
                    warn!(key = %session.key(), error = %error, "Frame pre-encoding failed; falling back to on-demand encoding");
                    None
                }
                Err(error) => {
                    warn!(key = %session.key(), error = %error, "Frame pre-encoding task failed");
                    None
                }
            }
        }
        _ => None,
    };

    session.mark_ready(data, encoded);
}
