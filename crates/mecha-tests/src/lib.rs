//! Integration tests for the diagnostics pipeline
//!
//! End-to-end tests that exercise the full stack with the shipped catalog
//! and the bench capture under `config/`:
//! - Replay line source and frame decoding
//! - Fault lifecycle and health scoring
//! - Report assembly and the HTTP API
//!
//! # Test Structure
//!
//! - `pipeline_test.rs` - replay capture through to reports
//! - `api_e2e_test.rs` - HTTP API over a live engine

use std::path::PathBuf;
use std::sync::Arc;

use mecha_obd::{DiagnosticsEngine, EngineConfig, FaultCatalog, ReplaySource, ScoringConfig, Session};
use tokio::sync::watch;

/// Repository `config/` directory
pub fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config")
}

/// Engine with default settings and the shipped DTC catalog
pub fn engine() -> Arc<DiagnosticsEngine> {
    let catalog = FaultCatalog::from_file(config_dir().join("dtc-codes.yaml"))
        .expect("shipped catalog loads");
    Arc::new(
        DiagnosticsEngine::new(
            EngineConfig::default(),
            ScoringConfig::default(),
            Arc::new(catalog),
        )
        .expect("default config is valid"),
    )
}

/// Open a session and replay the bench capture into it to completion
pub async fn replay_sample(engine: &DiagnosticsEngine) -> Arc<Session> {
    let session = engine.open_session("bench", Some("Bench capture".into()));
    let mut source = ReplaySource::open(config_dir().join("replay/sample.log"), false)
        .await
        .expect("sample capture opens");
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let mut ingestor = engine.ingestor(session.clone());
    ingestor.run(&mut source, cancel_rx).await;
    session
}
