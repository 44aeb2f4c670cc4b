//! Wire contracts shared between the replay server and its clients.
//!
//! Loading and control messages travel as JSON text frames; frame data
//! travels as binary MessagePack payloads owned by `replay-core`'s codec.

use serde::{Deserialize, Serialize};

use replay_core::SessionType;

pub const REPLAY_PROTOCOL_CONTRACT_VERSION_V1: &str = "replay_protocol.v1";

/// Server → client loading events, sent as JSON text messages.
///
/// A client sees zero or more `loading_progress` events followed by
/// exactly one of `loading_complete` or `loading_error`. `ready` follows
/// `loading_complete` as an advisory terminal signal; clients must treat
/// `loading_complete` itself as the end of the loading phase. There is no
/// `loading_started` — the first `loading_progress` implies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    LoadingProgress {
        progress: u8,
        message: String,
        elapsed_seconds: u64,
    },
    LoadingComplete {
        frames: u64,
        load_time_seconds: f64,
        elapsed_seconds: u64,
    },
    LoadingError {
        message: String,
    },
    Ready {
        frames: u64,
        load_time_seconds: f64,
    },
}

/// Client → server playback control, sent as JSON text messages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    Play { speed: f64 },
    Pause,
    Seek { frame: u64 },
}

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub year: u16,
    pub round: u8,
    pub session_type: SessionType,
    /// Destroy and re-create the session, discarding any cached load.
    #[serde(default)]
    pub refresh: bool,
}

/// Response to `POST /sessions`. Carries no loading status: loading state
/// is communicated exclusively over the replay channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}
