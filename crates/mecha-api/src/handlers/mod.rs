//! HTTP request handlers
//!
//! Handlers only translate between HTTP and the `DiagnosticsQuery` trait.

pub mod data;
pub mod events;
pub mod faults;
pub mod health;
pub mod reports;
pub mod sessions;

use serde::Serialize;

/// Collection envelope shared by list endpoints
#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total_count: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        let total_count = items.len();
        Self { items, total_count }
    }
}
