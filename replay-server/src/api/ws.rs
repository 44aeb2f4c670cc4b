use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::select;
use tokio::time::{self, Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use replay_contracts::{ClientCommand, ServerEvent};
use replay_core::{LoadingState, SessionKey, encode_frame};

use super::state::AppState;
use crate::playback::PlaybackState;
use crate::session::{ProgressSubscription, Session};

/// How often the playback loop runs.
const PLAYBACK_TICK: Duration = Duration::from_millis(16);

/// How long each tick waits for a client control message.
const CONTROL_POLL: Duration = Duration::from_millis(10);

/// Fallback poll while waiting for the load to settle; the subscriber is
/// what actually pushes progress to the client during the wait.
const READY_POLL: Duration = Duration::from_millis(250);

/// WebSocket upgrade handler — one replay channel per client per session,
/// multiplexing loading events (JSON text) and frame data (binary).
pub async fn ws_replay_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let session = session_id
        .parse::<SessionKey>()
        .ok()
        .and_then(|key| state.registry.get(key));
    let Some(session) = session else {
        warn!(
            connection_id = %connection_id,
            session_id = %session_id,
            "Replay channel requested for unknown session"
        );
        let _ = send_event(
            &mut sender,
            &ServerEvent::LoadingError {
                message: "Session not found".to_string(),
            },
        )
        .await;
        return;
    };

    info!(connection_id = %connection_id, key = %session.key(), "Replay client connected");

    // The subscription guard unregisters on drop, covering every exit
    // path below — success, error, and disconnect alike.
    let mut subscription = session.subscribe();

    let ready = wait_until_ready(
        &mut sender,
        &mut receiver,
        &session,
        &mut subscription,
        state.load_options.timeout,
    )
    .await;
    if !ready {
        info!(connection_id = %connection_id, key = %session.key(), "Replay client left during load");
        return;
    }

    let frames = session.frame_count() as u64;
    let load_time_seconds = session.load_time_seconds();
    if send_event(
        &mut sender,
        &ServerEvent::LoadingComplete {
            frames,
            load_time_seconds,
            elapsed_seconds: session.elapsed_seconds(),
        },
    )
    .await
    .is_err()
    {
        return;
    }
    if send_event(
        &mut sender,
        &ServerEvent::Ready {
            frames,
            load_time_seconds,
        },
    )
    .await
    .is_err()
    {
        return;
    }

    if !session.key().session_type.streams_frames() {
        // Qualifying: clients fetch segment data over HTTP and interpolate
        // locally; there is no frame stream to run.
        info!(key = %session.key(), "Qualifying session ready; no frame streaming");
        return;
    }

    playback_loop(&mut sender, &mut receiver, &session).await;
    info!(connection_id = %connection_id, key = %session.key(), "Replay client disconnected");
}

/// Forward progress events until the session settles. Returns true when
/// the session is ready for playback; on error, timeout, or disconnect
/// the terminal message (if any) has already been sent.
async fn wait_until_ready(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    receiver: &mut SplitStream<WebSocket>,
    session: &Session,
    subscription: &mut ProgressSubscription,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    // Delay the first poll so queued catch-up events win the first round.
    let mut poll = time::interval_at(Instant::now() + READY_POLL, READY_POLL);
    poll.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        select! {
            biased;

            event = subscription.recv() => {
                let Some(event) = event else {
                    return false;
                };
                match event.state {
                    LoadingState::Init | LoadingState::Loading => {
                        let progress = ServerEvent::LoadingProgress {
                            progress: event.progress,
                            message: event.message,
                            elapsed_seconds: event.elapsed_seconds,
                        };
                        if send_event(sender, &progress).await.is_err() {
                            return false;
                        }
                    }
                    LoadingState::Ready => return true,
                    LoadingState::Error => {
                        let _ = send_event(sender, &ServerEvent::LoadingError {
                            message: event.message,
                        }).await;
                        return false;
                    }
                }
            }
            _ = poll.tick() => {
                match session.state() {
                    LoadingState::Ready => return true,
                    LoadingState::Error => {
                        let message = session
                            .load_error()
                            .unwrap_or_else(|| "Load failed".to_string());
                        let _ = send_event(sender, &ServerEvent::LoadingError { message }).await;
                        return false;
                    }
                    LoadingState::Init | LoadingState::Loading => {}
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(WsMessage::Close(_))) | None => return false,
                    Some(Err(error)) => {
                        warn!(error = %error, "Replay channel receive error during load");
                        return false;
                    }
                    // Control messages before the session is ready are ignored.
                    Some(Ok(_)) => {}
                }
            }
            _ = time::sleep_until(deadline) => {
                warn!(key = %session.key(), "Timed out waiting for session load");
                let _ = send_event(sender, &ServerEvent::LoadingError {
                    message: format!(
                        "Load failed: timed out after {}s",
                        timeout.as_secs()
                    ),
                }).await;
                return false;
            }
        }
    }
}

/// Stream frames under client control. The handler is the sole writer to
/// the channel; if the transport backs up, the send blocks this loop and
/// playback stalls with it — no internal frame buffering.
async fn playback_loop(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    receiver: &mut SplitStream<WebSocket>,
    session: &Session,
) {
    let Some(data) = session.data() else {
        return;
    };
    let frames = data.frames().unwrap_or_default();
    let encoded = session.encoded_frames();
    let total = frames.len();

    let mut playback = PlaybackState::new();
    let mut ticker = time::interval(PLAYBACK_TICK);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        match time::timeout(CONTROL_POLL, receiver.next()).await {
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                match serde_json::from_str::<ClientCommand>(text.as_str()) {
                    Ok(command) => playback.apply(command),
                    Err(error) => {
                        // Malformed control is non-fatal; the channel stays open.
                        warn!(error = %error, "Ignoring malformed control message");
                    }
                }
            }
            Ok(Some(Ok(WsMessage::Close(_)))) | Ok(None) => break,
            Ok(Some(Err(error))) => {
                warn!(error = %error, "Replay channel receive error");
                break;
            }
            Ok(Some(Ok(_))) => {}
            // No control message this tick.
            Err(_) => {}
        }

        if let Some(index) = playback.tick(total) {
            let payload: Bytes = match &encoded {
                Some(list) => list[index].clone(),
                None => match encode_frame(index as u32, &frames[index]) {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(error) => {
                        warn!(error = %error, index, "Frame encoding failed");
                        continue;
                    }
                },
            };
            if sender.send(WsMessage::Binary(payload)).await.is_err() {
                break;
            }
        }

        ticker.tick().await;
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    event: &ServerEvent,
) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(error) => {
            warn!(error = %error, "Failed to serialize server event");
            return Ok(());
        }
    };

    if sender.send(WsMessage::text(json)).await.is_err() {
        return Err(());
    }

    Ok(())
}
