//! Report handlers
//!
//! Reports are immutable for a given window and input, so the content hash
//! doubles as a strong ETag for downstream caches.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use mecha_core::{SessionId, Timestamp};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct ReportQuery {
    /// RFC 3339 window start
    pub start: Option<String>,
    /// RFC 3339 window end
    pub end: Option<String>,
}

fn parse_bound(name: &str, value: Option<&str>) -> Result<Timestamp, ApiError> {
    let value = value.ok_or_else(|| ApiError::BadRequest(format!("missing '{}'", name)))?;
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ApiError::BadRequest(format!("invalid '{}' ({}): {}", name, value, e)))
}

/// GET /api/v1/sessions/{session_id}/report?start=&end=
pub async fn get_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ReportQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let start = parse_bound("start", query.start.as_deref())?;
    let end = parse_bound("end", query.end.as_deref())?;

    let report = state
        .query()
        .get_report(&SessionId::from(session_id), start, end)
        .await?;

    let etag = format!("\"{}\"", report.content_hash());
    let etag_value =
        HeaderValue::from_str(&etag).map_err(|e| ApiError::Internal(e.to_string()))?;

    let unchanged = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == etag));
    if unchanged {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag_value)]).into_response());
    }

    Ok(([(header::ETAG, etag_value)], Json(report)).into_response())
}
