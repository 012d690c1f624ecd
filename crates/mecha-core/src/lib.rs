//! mecha-core - Core types and traits for vehicle diagnostics
//!
//! This crate holds the data model shared by the ingestion engine and the
//! presentation adapters: decoded readings, fault reference data, fault
//! lifecycle state, subsystem health and immutable reports. The
//! [`DiagnosticsQuery`] trait is the read-only seam the HTTP layer (or any
//! other presentation collaborator) consumes.

pub mod error;
pub mod models;
pub mod query;

pub use error::{DiagnosticsError, DiagnosticsResult};
pub use models::*;
pub use query::DiagnosticsQuery;
