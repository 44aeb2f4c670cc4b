//! Session entity and progress event bus.
//!
//! A `Session` owns one `(year, round, session_type)` load: its lifecycle
//! state, the processed frames once ready, pre-encoded frame payloads,
//! and the set of progress subscribers. Subscribers are tokio unbounded
//! senders, so emitting never blocks the caller; each subscriber's channel
//! is drained by its own cooperative task (the WebSocket handler), which
//! keeps per-client event order intact while imposing none across clients.

pub mod load;
pub mod registry;

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

use replay_core::{LoadingState, SessionKey, SessionMetadata};
use replay_pipeline::ProcessedSession;

/// One progress update, as delivered to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub state: LoadingState,
    pub progress: u8,
    pub message: String,
    pub elapsed_seconds: u64,
}

struct SessionInner {
    state: LoadingState,
    progress: u8,
    status_message: String,
    load_error: Option<String>,
    data: Option<Arc<ProcessedSession>>,
    encoded_frames: Option<Arc<Vec<Bytes>>>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<ProgressEvent>>,
}

/// Process-scoped session entity. Created on first request for its key,
/// loaded exactly once, destroyed only by a refresh or process exit.
pub struct Session {
    key: SessionKey,
    created_at: Instant,
    load_started: AtomicBool,
    next_subscriber_id: AtomicU64,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new(key: SessionKey) -> Arc<Self> {
        Arc::new(Self {
            key,
            created_at: Instant::now(),
            load_started: AtomicBool::new(false),
            next_subscriber_id: AtomicU64::new(1),
            inner: Mutex::new(SessionInner {
                state: LoadingState::Init,
                progress: 0,
                status_message: String::new(),
                load_error: None,
                data: None,
                encoded_frames: None,
                subscribers: HashMap::new(),
            }),
        })
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn state(&self) -> LoadingState {
        self.inner.lock().state
    }

    pub fn load_error(&self) -> Option<String> {
        self.inner.lock().load_error.clone()
    }

    /// Seconds since the session was created.
    pub fn elapsed_seconds(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }

    /// Processed data, available once `state == Ready`.
    pub fn data(&self) -> Option<Arc<ProcessedSession>> {
        self.inner.lock().data.clone()
    }

    pub fn metadata(&self) -> Option<SessionMetadata> {
        self.inner.lock().data.as_ref().map(|d| d.metadata.clone())
    }

    pub fn frame_count(&self) -> usize {
        self.inner
            .lock()
            .data
            .as_ref()
            .map(|d| d.frame_count())
            .unwrap_or(0)
    }

    pub fn load_time_seconds(&self) -> f64 {
        self.inner
            .lock()
            .data
            .as_ref()
            .map(|d| d.load_time_seconds)
            .unwrap_or(0.0)
    }

    /// Binary payloads pre-encoded at load time, when the session fit the
    /// pre-encoding limit.
    pub fn encoded_frames(&self) -> Option<Arc<Vec<Bytes>>> {
        self.inner.lock().encoded_frames.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Claim the right to load. Returns true exactly once per session.
    pub(crate) fn begin_load(&self) -> bool {
        self.load_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Register a progress subscriber.
    ///
    /// The returned guard unregisters on drop, on every exit path. A
    /// subscriber that registers after the session settled receives a
    /// synthetic catch-up (final loading event, then the terminal event)
    /// so every client sees a uniform sequence even on cache hits.
    pub fn subscribe(self: &Arc<Self>) -> ProgressSubscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut inner = self.inner.lock();
            match inner.state {
                LoadingState::Ready => {
                    let elapsed = self.elapsed_seconds();
                    let _ = tx.send(ProgressEvent {
                        state: LoadingState::Loading,
                        progress: 100,
                        message: "Ready for playback".to_string(),
                        elapsed_seconds: elapsed,
                    });
                    let _ = tx.send(ProgressEvent {
                        state: LoadingState::Ready,
                        progress: 100,
                        message: inner.status_message.clone(),
                        elapsed_seconds: elapsed,
                    });
                }
                LoadingState::Error => {
                    let _ = tx.send(ProgressEvent {
                        state: LoadingState::Error,
                        progress: 0,
                        message: inner
                            .load_error
                            .clone()
                            .unwrap_or_else(|| "Load failed".to_string()),
                        elapsed_seconds: self.elapsed_seconds(),
                    });
                }
                LoadingState::Init | LoadingState::Loading => {}
            }
            inner.subscribers.insert(id, tx);
        }

        ProgressSubscription {
            session: Arc::clone(self),
            id,
            rx,
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.inner.lock().subscribers.remove(&id);
    }

    /// Update loading fields and fan the effective event out to every
    /// subscriber.
    ///
    /// Arguments use explicit optional semantics: `None` means "keep the
    /// stored value", while `Some(0)` is a real update. Collapsing the
    /// two would silently corrupt client progress bars.
    pub fn emit_progress(
        &self,
        state: Option<LoadingState>,
        progress: Option<u8>,
        message: Option<&str>,
    ) {
        let (event, senders) = {
            let mut inner = self.inner.lock();
            if let Some(state) = state {
                inner.state = state;
            }
            if let Some(progress) = progress {
                inner.progress = progress;
            }
            if let Some(message) = message {
                inner.status_message = message.to_string();
            }

            let event = ProgressEvent {
                state: inner.state,
                progress: inner.progress,
                message: inner.status_message.clone(),
                elapsed_seconds: self.elapsed_seconds(),
            };
            let senders: Vec<mpsc::UnboundedSender<ProgressEvent>> =
                inner.subscribers.values().cloned().collect();
            (event, senders)
        };

        for sender in senders {
            // A dead subscriber (client gone, channel dropped) must not
            // affect the session or the other subscribers.
            if sender.send(event.clone()).is_err() {
                debug!(key = %self.key, "Dropped progress event for closed subscriber");
            }
        }
    }

    /// Publish the processed data and flip to Ready.
    pub(crate) fn mark_ready(
        &self,
        data: Arc<ProcessedSession>,
        encoded_frames: Option<Arc<Vec<Bytes>>>,
    ) {
        {
            let mut inner = self.inner.lock();
            inner.data = Some(data);
            inner.encoded_frames = encoded_frames;
        }
        self.emit_progress(
            Some(LoadingState::Loading),
            Some(100),
            Some("Ready for playback"),
        );
        self.emit_progress(Some(LoadingState::Ready), Some(100), None);
    }

    pub(crate) fn mark_error(&self, message: String) {
        self.inner.lock().load_error = Some(message.clone());
        self.emit_progress(Some(LoadingState::Error), Some(0), Some(&message));
    }
}

/// RAII progress subscription: receive events through `recv`, and the
/// session forgets the subscriber when the guard drops.
pub struct ProgressSubscription {
    session: Arc<Session>,
    id: u64,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressSubscription {
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.session.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_core::SessionType;

    fn key() -> SessionKey {
        SessionKey::new(2024, 6, SessionType::Race)
    }

    #[tokio::test]
    async fn emit_delivers_to_subscribers_in_order() {
        let session = Session::new(key());
        let mut sub = session.subscribe();

        session.emit_progress(Some(LoadingState::Loading), Some(0), Some("start"));
        session.emit_progress(None, Some(40), Some("halfway"));
        session.emit_progress(None, Some(80), None);

        let first = sub.recv().await.unwrap();
        assert_eq!(first.progress, 0);
        assert_eq!(first.message, "start");

        let second = sub.recv().await.unwrap();
        assert_eq!(second.progress, 40);

        let third = sub.recv().await.unwrap();
        assert_eq!(third.progress, 80);
        // Message untouched by the None argument
        assert_eq!(third.message, "halfway");
    }

    #[tokio::test]
    async fn progress_zero_is_an_update_not_a_gap() {
        let session = Session::new(key());
        session.emit_progress(Some(LoadingState::Loading), Some(75), Some("almost"));

        let mut sub = session.subscribe();
        session.emit_progress(None, Some(0), Some("restarted"));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.progress, 0);
        assert_eq!(event.message, "restarted");
    }

    #[tokio::test]
    async fn subscription_guard_unregisters_on_drop() {
        let session = Session::new(key());
        {
            let _sub = session.subscribe();
            assert_eq!(session.subscriber_count(), 1);
        }
        assert_eq!(session.subscriber_count(), 0);

        // Emitting into an empty subscriber set is a no-op.
        session.emit_progress(Some(LoadingState::Loading), Some(10), None);
    }

    #[tokio::test]
    async fn closed_subscriber_does_not_affect_others() {
        let session = Session::new(key());
        let mut alive = session.subscribe();
        let dead = session.subscribe();
        drop(dead);

        session.emit_progress(Some(LoadingState::Loading), Some(33), Some("tick"));
        assert_eq!(alive.recv().await.unwrap().progress, 33);
    }

    #[tokio::test]
    async fn begin_load_claims_exactly_once() {
        let session = Session::new(key());
        assert!(session.begin_load());
        assert!(!session.begin_load());
        assert!(!session.begin_load());
    }
}
