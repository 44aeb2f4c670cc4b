use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::info;

use replay_contracts::{CreateSessionRequest, CreateSessionResponse};
use replay_core::{LoadingState, SessionKey, SessionMetadata};
use replay_pipeline::{QualifyingReplay, ReplayPayload};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::session::load::schedule_load;

#[derive(Debug, Serialize)]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub state: LoadingState,
    pub frames: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SessionMetadata>,
}

/// POST /sessions — Create (or rediscover) a session and schedule its
/// load. Returns immediately; the response carries no loading status —
/// loading state travels exclusively over the replay channel.
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Json<CreateSessionResponse> {
    let key = SessionKey::new(req.year, req.round, req.session_type);
    let (session, created) = state.registry.get_or_create(key, req.refresh);

    if created {
        info!(key = %key, refresh = req.refresh, "Scheduling session load");
    }
    schedule_load(
        &session,
        state.provider.clone(),
        state.cache.clone(),
        state.load_options.clone(),
    );

    Json(CreateSessionResponse {
        session_id: key.to_string(),
    })
}

/// GET /sessions/{id} — Session discovery. Metadata appears once the
/// load finishes; this endpoint is not for polling loading progress.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfoResponse>, ApiError> {
    let key: SessionKey = id.parse()?;
    let session = state
        .registry
        .get(key)
        .ok_or_else(|| ApiError::NotFound(format!("Session {id} not found")))?;

    Ok(Json(SessionInfoResponse {
        session_id: key.to_string(),
        state: session.state(),
        frames: session.frame_count() as u64,
        metadata: session.metadata(),
    }))
}

/// GET /sessions/{id}/qualifying — Segment-keyed qualifying replay data.
/// Clients interpolate these laps locally; the replay channel does not
/// stream frames for qualifying sessions.
pub async fn qualifying(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QualifyingReplay>, ApiError> {
    let key: SessionKey = id.parse()?;
    let session = state
        .registry
        .get(key)
        .ok_or_else(|| ApiError::NotFound(format!("Session {id} not found")))?;

    if session.state() != LoadingState::Ready {
        return Err(ApiError::Conflict(format!(
            "Session {id} is not ready (state: {})",
            session.state().name()
        )));
    }

    let data = session
        .data()
        .ok_or_else(|| ApiError::Conflict(format!("Session {id} has no data")))?;

    match &data.payload {
        ReplayPayload::Qualifying { replay } => Ok(Json(replay.clone())),
        ReplayPayload::Race { .. } => Err(ApiError::BadRequest(format!(
            "Session {id} is not a qualifying session"
        ))),
    }
}
