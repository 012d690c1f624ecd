//! Live reading handlers

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Duration;
use mecha_core::{Pid, Reading, SessionId};
use serde::Deserialize;

use super::ListResponse;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_WINDOW_SECS: i64 = 60;

#[derive(Deserialize, Default)]
pub struct WindowQuery {
    /// Window length, measured back from the session's latest data
    pub seconds: Option<i64>,
}

/// GET /api/v1/sessions/{session_id}/latest
/// Latest reading per PID, for dashboard gauges
pub async fn latest_readings(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ListResponse<Reading>>, ApiError> {
    let readings = state
        .query()
        .get_latest(&SessionId::from(session_id))
        .await?;
    Ok(Json(readings.into()))
}

/// GET /api/v1/sessions/{session_id}/readings/{pid}?seconds=N
pub async fn pid_window(
    State(state): State<AppState>,
    Path((session_id, pid)): Path<(String, String)>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ListResponse<Reading>>, ApiError> {
    let pid: Pid = pid.parse().map_err(ApiError::BadRequest)?;
    let seconds = query.seconds.unwrap_or(DEFAULT_WINDOW_SECS);
    let duration = Duration::try_seconds(seconds).ok_or_else(|| {
        ApiError::BadRequest(format!("window of {} seconds is out of range", seconds))
    })?;

    let readings = state
        .query()
        .get_window(&SessionId::from(session_id), pid, duration)
        .await?;
    Ok(Json(readings.into()))
}
