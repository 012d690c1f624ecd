//! Application state for the diagnostics API

use std::sync::Arc;

use mecha_core::DiagnosticsQuery;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    query: Arc<dyn DiagnosticsQuery>,
}

impl AppState {
    /// Create a new AppState over a query implementation
    pub fn new(query: Arc<dyn DiagnosticsQuery>) -> Self {
        Self { query }
    }

    /// The read-only diagnostics query seam
    pub fn query(&self) -> &dyn DiagnosticsQuery {
        self.query.as_ref()
    }
}
