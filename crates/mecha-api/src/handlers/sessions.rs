//! Session listing handlers

use axum::extract::{Path, State};
use axum::Json;
use mecha_core::{SessionId, SessionInfo};

use super::ListResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/v1/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<ListResponse<SessionInfo>> {
    Json(state.query().sessions().await.into())
}

/// GET /api/v1/sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    let info = state
        .query()
        .session_info(&SessionId::from(session_id))
        .await?;
    Ok(Json(info))
}
