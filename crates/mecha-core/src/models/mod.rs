//! Shared data models for diagnostics sessions

mod event;
mod fault;
mod health;
mod reading;
mod report;
mod session;

pub use event::*;
pub use fault::*;
pub use health::*;
pub use reading::*;
pub use report::*;
pub use session::*;

/// Timestamps are UTC wall-clock instants supplied by the transport
pub type Timestamp = chrono::DateTime<chrono::Utc>;
