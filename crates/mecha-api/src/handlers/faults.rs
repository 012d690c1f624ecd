//! Fault and DTC handlers

use axum::extract::{Path, Query, State};
use axum::Json;
use mecha_core::{ActiveFault, DtcReport, DtcReportKind, FaultFilter, SessionId};
use serde::Deserialize;

use super::ListResponse;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct FaultFilterQuery {
    pub severity: Option<String>,
    pub system: Option<String>,
}

impl FaultFilterQuery {
    fn into_filter(self) -> Result<Option<FaultFilter>, ApiError> {
        if self.severity.is_none() && self.system.is_none() {
            return Ok(None);
        }
        Ok(Some(FaultFilter {
            severity: self
                .severity
                .map(|s| s.parse())
                .transpose()
                .map_err(ApiError::BadRequest)?,
            system: self
                .system
                .map(|s| s.parse())
                .transpose()
                .map_err(ApiError::BadRequest)?,
        }))
    }
}

/// GET /api/v1/sessions/{session_id}/faults?severity=&system=
/// Faults currently surfaced (active or clearing)
pub async fn list_faults(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<FaultFilterQuery>,
) -> Result<Json<ListResponse<ActiveFault>>, ApiError> {
    let filter = query.into_filter()?;
    let faults = state
        .query()
        .get_active_faults(&SessionId::from(session_id), filter.as_ref())
        .await?;
    Ok(Json(faults.into()))
}

/// GET /api/v1/sessions/{session_id}/faults/history
pub async fn fault_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ListResponse<ActiveFault>>, ApiError> {
    let faults = state
        .query()
        .get_fault_history(&SessionId::from(session_id))
        .await?;
    Ok(Json(faults.into()))
}

/// GET /api/v1/sessions/{session_id}/pending
/// Latest mode 07 report; `null` until one has been received
pub async fn pending_dtcs(
    state: State<AppState>,
    path: Path<String>,
) -> Result<Json<Option<DtcReport>>, ApiError> {
    dtc_snapshot(state, path, DtcReportKind::Pending).await
}

/// GET /api/v1/sessions/{session_id}/permanent
pub async fn permanent_dtcs(
    state: State<AppState>,
    path: Path<String>,
) -> Result<Json<Option<DtcReport>>, ApiError> {
    dtc_snapshot(state, path, DtcReportKind::Permanent).await
}

async fn dtc_snapshot(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    kind: DtcReportKind,
) -> Result<Json<Option<DtcReport>>, ApiError> {
    let report = state
        .query()
        .get_dtc_snapshot(&SessionId::from(session_id), kind)
        .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mecha_core::{Severity, SubsystemTag};

    #[test]
    fn test_filter_query_parsing() {
        let empty = FaultFilterQuery::default().into_filter().unwrap();
        assert!(empty.is_none());

        let filter = FaultFilterQuery {
            severity: Some("HIGH".into()),
            system: Some("electrical".into()),
        }
        .into_filter()
        .unwrap()
        .unwrap();
        assert_eq!(filter.severity, Some(Severity::High));
        assert_eq!(filter.system, Some(SubsystemTag::Battery));

        let bad = FaultFilterQuery {
            severity: Some("urgent".into()),
            system: None,
        }
        .into_filter();
        assert!(matches!(bad, Err(ApiError::BadRequest(_))));
    }
}
