//! mecha-api - HTTP/JSON layer over live diagnostics sessions
//!
//! The router only depends on the [`DiagnosticsQuery`] trait, so it can be
//! served over the real engine or over a test double.
//!
//! # Usage
//!
//! ```ignore
//! use mecha_api::{create_router, AppState};
//!
//! let state = AppState::new(engine);
//! let router = create_router(state);
//! ```
//!
//! [`DiagnosticsQuery`]: mecha_core::DiagnosticsQuery

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the diagnostics REST API router with the given application state
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Liveness
        .route("/health", get(|| async { "OK" }))
        // Sessions
        .route("/api/v1/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/api/v1/sessions/{session_id}",
            get(handlers::sessions::get_session),
        )
        // Readings
        .route(
            "/api/v1/sessions/{session_id}/latest",
            get(handlers::data::latest_readings),
        )
        .route(
            "/api/v1/sessions/{session_id}/readings/{pid}",
            get(handlers::data::pid_window),
        )
        // Faults
        .route(
            "/api/v1/sessions/{session_id}/faults",
            get(handlers::faults::list_faults),
        )
        .route(
            "/api/v1/sessions/{session_id}/faults/history",
            get(handlers::faults::fault_history),
        )
        .route(
            "/api/v1/sessions/{session_id}/pending",
            get(handlers::faults::pending_dtcs),
        )
        .route(
            "/api/v1/sessions/{session_id}/permanent",
            get(handlers::faults::permanent_dtcs),
        )
        // Health and reports
        .route(
            "/api/v1/sessions/{session_id}/health",
            get(handlers::health::vehicle_health),
        )
        .route(
            "/api/v1/sessions/{session_id}/report",
            get(handlers::reports::get_report),
        )
        // Streaming
        .route(
            "/api/v1/sessions/{session_id}/events",
            get(handlers::events::stream_events),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
