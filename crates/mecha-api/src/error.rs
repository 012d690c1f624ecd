//! API error types and conversions

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mecha_core::DiagnosticsError;
use serde::Serialize;

/// API error type that converts to HTTP responses
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request
    BadRequest(String),
    /// 404 Not Found
    NotFound(String),
    /// 422 Unprocessable Entity (valid request, nothing to report)
    UnprocessableEntity(String),
    /// 500 Internal Server Error
    Internal(String),
}

/// Standard error response format
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::UnprocessableEntity(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        if status.is_server_error() {
            tracing::error!(error = error_type, %message, "API error");
        } else if status.is_client_error() {
            tracing::debug!(error = error_type, %message, "API client error");
        }

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<DiagnosticsError> for ApiError {
    fn from(err: DiagnosticsError) -> Self {
        let message = err.to_string();
        match err {
            DiagnosticsError::SessionNotFound(_) => ApiError::NotFound(message),
            DiagnosticsError::EmptyWindow { .. } => ApiError::UnprocessableEntity(message),
            DiagnosticsError::InvalidWindow(_) | DiagnosticsError::InvalidRequest(_) => {
                ApiError::BadRequest(message)
            }
            DiagnosticsError::Internal(_) => ApiError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mecha_core::SessionId;

    #[test]
    fn test_status_follows_core_mapping() {
        let cases = [
            DiagnosticsError::SessionNotFound(SessionId::from("s1")),
            DiagnosticsError::EmptyWindow {
                start: "a".into(),
                end: "b".into(),
            },
            DiagnosticsError::InvalidWindow("inverted".into()),
            DiagnosticsError::InvalidRequest("bad pid".into()),
            DiagnosticsError::Internal("boom".into()),
        ];
        for err in cases {
            let expected = err.status_code();
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status().as_u16(), expected);
        }
    }
}
