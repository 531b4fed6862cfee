#![forbid(unsafe_code)]

//! `focus-bridge` — desktop activity bridge daemon.
//!
//! Bootstraps configuration, starts the backend supervisor, the relay
//! HTTP server, and the window focus tracker, and wires their events
//! through a single coordinator that maintains the shell-facing status
//! snapshot.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use focus_bridge::backend::{BackendClient, Supervisor};
use focus_bridge::config::GlobalConfig;
use focus_bridge::events::{spawn_event_consumer, StatusSnapshot};
use focus_bridge::relay::{serve, spawn_liveness_timer, CommandQueue, RelayState};
use focus_bridge::tracker::{platform_probe, FocusTracker};
use focus_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "focus-bridge", about = "Desktop activity bridge daemon", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("focus-bridge daemon bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config_text = std::fs::read_to_string(&args.config)
        .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
    let config = GlobalConfig::from_toml_str(&config_text)?;
    info!("configuration loaded");

    let ct = CancellationToken::new();

    // ── Event channel and coordinator ───────────────────
    let (event_tx, event_rx) = mpsc::channel(64);
    let (status_tx, status_rx) = watch::channel(StatusSnapshot::initial());
    let coordinator = spawn_event_consumer(event_rx, status_tx, ct.clone());

    // ── Backend supervisor ──────────────────────────────
    let supervisor = Arc::new(Supervisor::new(config.backend.clone(), event_tx.clone())?);
    if let Err(err) = supervisor.start().await {
        // Fatal for supervision (no retry), not for the bridge: the
        // shell keeps running and shows the backend as offline.
        error!(%err, "backend startup failed; continuing with backend offline");
    }

    let backend = Arc::new(BackendClient::new(&config.backend)?);

    // ── Relay server ────────────────────────────────────
    let (session_tx, session_rx) = watch::channel(None);
    let liveness = spawn_liveness_timer(
        Duration::from_secs(config.relay.liveness_timeout_secs),
        event_tx.clone(),
        ct.clone(),
    );

    let relay_state = Arc::new(RelayState {
        backend: Arc::clone(&backend),
        session: RwLock::new(None),
        session_tx,
        liveness,
        commands: CommandQueue::new(),
        events: event_tx.clone(),
        status_rx,
    });

    let relay_ct = ct.clone();
    let relay_port = config.relay.http_port;
    let relay_handle = tokio::spawn(async move {
        if let Err(err) = serve(relay_state, relay_port, relay_ct).await {
            error!(%err, "relay server failed");
        }
    });

    // ── Window focus tracker ────────────────────────────
    let tracker = FocusTracker::new(
        platform_probe(),
        Arc::clone(&backend),
        session_rx,
        event_tx.clone(),
        config.tracker.clone(),
    );
    let tracker_handle = tracker.spawn(ct.clone());

    info!("focus-bridge ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    // ── Settle in-flight work before releasing resources ─
    // The tracker performs its final flush inside its cancelled branch;
    // join it before the backend goes away.
    let _ = tracker_handle.await;
    supervisor.stop().await;
    let _ = tokio::join!(relay_handle, coordinator);
    info!("focus-bridge shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
