//! mecha-obd - OBD-II ingestion and health-scoring engine
//!
//! This crate turns a noisy adapter byte stream into per-session diagnostic
//! state: decoded readings, debounced fault lifecycles, subsystem health and
//! reproducible reports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DiagnosticsEngine                         │
//! │  Implements DiagnosticsQuery, owns SessionId -> Session     │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │FaultCatalog │  │HealthScorer │  │ReportAssembler      │ │
//! │  │ (static)    │  │ (pure)      │  │ (pure)              │ │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘ │
//! │                          ▲ snapshot                         │
//! │            ┌─────────────┴─────────────┐                    │
//! │            │ Session (Mutex)            │                    │
//! │            │ SessionBuffer + FaultTracker│                   │
//! │            └─────────────▲─────────────┘                    │
//! │                          │ apply                            │
//! │                    ┌─────┴─────┐                            │
//! │                    │ Ingestor  │ FrameDecoder               │
//! │                    └─────┬─────┘                            │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │   LineSource    │                         │
//! │                 │(TCP/replay/chan)│                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod buffer;
pub mod catalog;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod report;
pub mod scoring;
pub mod session;
pub mod source;
pub mod tracker;

pub use buffer::SessionBuffer;
pub use catalog::FaultCatalog;
pub use config::{EngineConfig, ReadingRule, ScoringConfig, TrackerConfig};
pub use decode::{DecodeError, Frame, FrameDecoder, Framing};
pub use engine::DiagnosticsEngine;
pub use error::{CatalogError, ConfigError, TrackerError};
pub use ingest::{IngestExit, IngestStats, Ingestor};
pub use report::ReportAssembler;
pub use scoring::HealthScorer;
pub use session::{Session, SessionSnapshot};
pub use source::{
    ChannelSource, LineSource, PollPlan, RawLine, ReplaySource, SourceError, TcpLineSource,
};
pub use tracker::{FaultTracker, ScanOutcome};

// Re-export for convenience
pub use mecha_core::{
    ActiveFault, DiagnosticsError, DiagnosticsQuery, DiagnosticsResult, DtcCode, DtcReport,
    FaultCode, Pid, Reading, Report, SessionEvent, SessionId, SubsystemHealth, VehicleHealth,
};
