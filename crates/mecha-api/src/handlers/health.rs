//! Health score handlers

use axum::extract::{Path, State};
use axum::Json;
use mecha_core::{SessionId, VehicleHealth};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/v1/sessions/{session_id}/health
/// Per-subsystem scores plus the vehicle aggregate
pub async fn vehicle_health(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<VehicleHealth>, ApiError> {
    let health = state
        .query()
        .get_vehicle_health(&SessionId::from(session_id))
        .await?;
    Ok(Json(health))
}
