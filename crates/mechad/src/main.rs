//! mechad - vehicle diagnostics daemon
//!
//! Ingests OBD-II adapter data for every configured vehicle, tracks faults,
//! scores subsystem health and serves the results over HTTP.
//!
//! Usage:
//!   mechad [--config mechad.toml] [--catalog dtc-codes.yaml] [--bind ADDR]
//!          [--replay capture.log]... [--log-format text|json]

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use mecha_api::{create_router, AppState};
use mecha_obd::{
    DiagnosticsEngine, FaultCatalog, LineSource, ReplaySource, Session, SourceError,
    TcpLineSource,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{DaemonConfig, SourceConfig, VehicleConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "mechad")]
#[command(author, version, about = "Vehicle diagnostics daemon")]
struct Args {
    /// Daemon config file (TOML)
    #[arg(short, long, env = "MECHAD_CONFIG")]
    config: Option<PathBuf>,

    /// DTC catalog file (YAML); overrides [catalog] path
    #[arg(long, env = "MECHAD_CATALOG")]
    catalog: Option<PathBuf>,

    /// HTTP listen address; overrides [server] bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Replay a captured adapter log as an extra vehicle (repeatable)
    #[arg(long)]
    replay: Vec<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mechad=info,mecha_api=info,mecha_obd=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    tracing::info!("Starting mechad");

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading config");
            DaemonConfig::load(path)?
        }
        None => {
            tracing::info!("No config file provided, using defaults");
            DaemonConfig::default()
        }
    };
    if let Some(catalog) = args.catalog {
        config.catalog.path = catalog;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    for (i, path) in args.replay.into_iter().enumerate() {
        config.vehicles.push(VehicleConfig {
            id: format!("replay-{}", i + 1),
            name: Some(path.display().to_string()),
            source: SourceConfig::Replay { path, pace: false },
        });
    }

    let catalog = FaultCatalog::from_file(&config.catalog.path)
        .with_context(|| format!("loading DTC catalog {}", config.catalog.path.display()))?;
    tracing::info!(codes = catalog.len(), path = %config.catalog.path.display(), "Loaded DTC catalog");

    let engine = Arc::new(
        DiagnosticsEngine::new(config.engine.clone(), config.scoring.clone(), Arc::new(catalog))
            .context("invalid engine configuration")?,
    );

    if config.vehicles.is_empty() {
        tracing::warn!("No vehicles configured; serving an empty session list");
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut ingestion = JoinSet::new();
    for vehicle in &config.vehicles {
        let session = engine.open_session(&vehicle.id, vehicle.name.clone());
        ingestion.spawn(run_vehicle(
            engine.clone(),
            session,
            vehicle.source.clone(),
            cancel_rx.clone(),
        ));
    }

    let state = AppState::new(engine.clone());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        })
        .await?;

    // Ingestion observes cancellation between frames
    let _ = cancel_tx.send(true);
    let drain = async { while ingestion.join_next().await.is_some() {} };
    if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
        tracing::warn!("Ingestion tasks did not stop in time");
    }

    Ok(())
}

/// Open the configured source and ingest until it ends
async fn run_vehicle(
    engine: Arc<DiagnosticsEngine>,
    session: Arc<Session>,
    source: SourceConfig,
    cancel: watch::Receiver<bool>,
) {
    let session_id = session.id().clone();
    let vehicle_id = session.vehicle_id().to_string();
    let mut line_source: Box<dyn LineSource> = match open_source(&source).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(session_id = %session_id, vehicle_id = %vehicle_id, error = %e, "Failed to open source");
            let _ = engine.close_session(&session_id);
            return;
        }
    };

    let mut ingestor = engine.ingestor(session);
    let exit = ingestor.run(line_source.as_mut(), cancel).await;
    let stats = ingestor.stats();
    tracing::info!(
        session_id = %session_id,
        vehicle_id = %vehicle_id,
        reason = %exit,
        frames = stats.frames,
        dropped = stats.dropped,
        "Vehicle ingestion finished"
    );
}

async fn open_source(source: &SourceConfig) -> Result<Box<dyn LineSource>, SourceError> {
    match source {
        SourceConfig::Tcp {
            address,
            poll,
            connect_timeout_ms,
        } => {
            let timeout = Duration::from_millis(*connect_timeout_ms);
            let source = TcpLineSource::connect(address, poll.clone(), timeout).await?;
            Ok(Box::new(source))
        }
        SourceConfig::Replay { path, pace } => {
            let source = ReplaySource::open(path, *pace).await?;
            Ok(Box::new(source))
        }
    }
}
