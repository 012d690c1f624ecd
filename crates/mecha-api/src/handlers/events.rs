//! Session event streaming
//!
//! Provides SSE (Server-Sent Events) for fault lifecycle and link events.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use mecha_core::{SessionEvent, SessionId};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::error::ApiError;
use crate::state::AppState;

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Fault(_) => "fault",
        SessionEvent::LinkDegraded { .. } => "link_degraded",
        SessionEvent::NoData { .. } => "no_data",
        SessionEvent::IngestionStopped { .. } => "ingestion_stopped",
    }
}

/// GET /api/v1/sessions/{session_id}/events
pub async fn stream_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = SessionId::from(session_id);
    // Subscribe before the existence check so no event slips between the two
    let receiver = state.query().subscribe();
    state.query().session_info(&session_id).await?;

    let stream = BroadcastStream::new(receiver).filter_map(move |result| match result {
        Ok(event) if event.session_id() == &session_id => Some(Ok::<_, Infallible>(
            Event::default()
                .event(event_name(&event))
                .data(serde_json::to_string(&event).unwrap_or_default()),
        )),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "Event subscriber lagged");
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
