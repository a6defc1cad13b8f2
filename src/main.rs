//! AquaSense anomaly detector
//!
//! Classifies temperature, pressure and flow telemetry against configured
//! thresholds and keeps a durable log of spike, drift and dropout anomalies.
//!
//! # Usage
//!
//! ```bash
//! # HTTP ingestion only (POST /data, POST /readings)
//! cargo run --release
//!
//! # Also ingest JSON lines from a simulator
//! python sensor_sim.py | ./aquasense --stdin
//!
//! # Explicit config and data directory
//! ./aquasense --config deploy/aquasense.toml --data-dir /var/lib/aquasense
//! ```
//!
//! # Environment Variables
//!
//! - `AQUASENSE_CONFIG`: Path to the TOML config (default: ./aquasense.toml)
//! - `AQUASENSE_CORS_ORIGINS`: Comma-separated allowed origins for the API
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aquasense::api::{create_app, ApiState};
use aquasense::background::{DropoutWatchdog, StoreFlusher};
use aquasense::config::MonitorConfig;
use aquasense::engine::AnomalyEngine;
use aquasense::pipeline::{IngestLoop, StdinSource};
use aquasense::storage::{self, AnomalySink, AnomalyStore, PersistenceError, ProcessLock};

use axum::Router;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "aquasense")]
#[command(about = "AquaSense sensor telemetry anomaly detector")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config (overrides $AQUASENSE_CONFIG and ./aquasense.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the server address (default: "0.0.0.0:8001")
    #[arg(short, long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Also read readings from stdin (one JSON frame or reading per line)
    #[arg(long)]
    stdin: bool,

    /// Override the directory holding the anomaly log
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    DropoutWatchdog,
    StdinIngest,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::DropoutWatchdog => write!(f, "DropoutWatchdog"),
            TaskName::StdinIngest => write!(f, "StdinIngest"),
        }
    }
}

fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

fn spawn_watchdog(
    task_set: &mut JoinSet<Result<TaskName>>,
    engine: Arc<AnomalyEngine>,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        DropoutWatchdog::new(engine).run(cancel_token).await;
        Ok(TaskName::DropoutWatchdog)
    });
}

fn spawn_stdin_ingest(
    task_set: &mut JoinSet<Result<TaskName>>,
    engine: Arc<AnomalyEngine>,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        let mut source = StdinSource::stdin();
        IngestLoop::new(engine, cancel_token).run(&mut source).await;
        Ok(TaskName::StdinIngest)
    });
}

/// Wait for tasks; the first failure or panic cancels everything else.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        match task_set.join_next().await {
            Some(Ok(Ok(task_name))) => {
                info!(task = %task_name, "Supervisor: task completed");
            }
            Some(Ok(Err(e))) => {
                error!("Supervisor: task failed: {}", e);
                cancel_token.cancel();
                drain(task_set).await;
                return Err(e);
            }
            Some(Err(e)) => {
                error!("Supervisor: task panicked: {}", e);
                cancel_token.cancel();
                drain(task_set).await;
                return Err(anyhow::anyhow!("Task panicked: {}", e));
            }
            None => {
                info!("Supervisor: all tasks completed");
                return Ok(());
            }
        }
    }
}

/// Let the remaining tasks finish their shutdown path.
async fn drain(task_set: &mut JoinSet<Result<TaskName>>) {
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!(task = %task_name, "Supervisor: task stopped");
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

fn load_config(args: &CliArgs) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load_from_file(path),
        None => MonitorConfig::load(),
    }
    .context("Invalid configuration")?;

    if let Some(dir) = &args.data_dir {
        config.storage.data_dir = dir.clone();
    }
    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }
    Ok(config)
}

/// Previously persisted anomalies. A corrupt log is not fatal: start empty
/// and let the next flush rewrite a clean file.
fn recover_history(sink: &dyn AnomalySink) -> Result<Vec<aquasense::Anomaly>> {
    match sink.load() {
        Ok(history) => {
            info!(
                backend = sink.backend_name(),
                count = history.len(),
                "Recovered anomaly history"
            );
            Ok(history)
        }
        Err(e @ PersistenceError::Corrupt { .. }) => {
            warn!(error = %e, "Anomaly log unreadable; starting with an empty log");
            Ok(Vec::new())
        }
        Err(e) => Err(e).context("Failed to load anomaly history"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = Arc::new(load_config(&args)?);

    info!("AquaSense anomaly detector starting");
    for parameter in aquasense::Parameter::ALL {
        let t = config.thresholds.get(parameter);
        info!(
            parameter = %parameter,
            normal = %format!("{}..={}", t.normal_min, t.normal_max),
            spike_low = t.spike_low,
            spike_high = t.spike_high,
            drift_readings = t.drift_consecutive_readings,
            dropout_secs = t.dropout_threshold_seconds,
            "Thresholds"
        );
    }

    let _process_lock = ProcessLock::acquire(&config.storage.data_dir)
        .context("Failed to acquire data directory lock")?;

    let sink = storage::open_sink(&config.storage).context("Failed to open anomaly sink")?;
    let store = Arc::new(AnomalyStore::with_history(recover_history(sink.as_ref())?));
    let engine = Arc::new(AnomalyEngine::new(Arc::clone(&config), Arc::clone(&store)));

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.addr))?;
    info!("HTTP server listening on {}", config.server.addr);

    let cancel_token = CancellationToken::new();
    {
        let cancel = cancel_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, shutting down");
                cancel.cancel();
            }
        });
    }

    // The flusher is not supervised with the producers: it keeps running
    // until they have all drained so the final flush sees every append.
    let flusher = StoreFlusher::new(Arc::clone(&store), sink, &config.storage).spawn();

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    let app = create_app(ApiState::new(Arc::clone(&engine)));
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    spawn_watchdog(&mut task_set, Arc::clone(&engine), cancel_token.clone());
    if args.stdin {
        spawn_stdin_ingest(&mut task_set, Arc::clone(&engine), cancel_token.clone());
    }

    let supervised = run_supervisor(&mut task_set, cancel_token).await;
    flusher.shutdown().await;
    supervised?;

    let stats = engine.stats();
    info!(
        ingested = stats.readings_ingested,
        rejected = stats.readings_rejected,
        spikes = stats.spikes,
        drifts = stats.drifts,
        dropouts = stats.dropouts,
        "AquaSense stopped"
    );
    Ok(())
}
