//! Backend process supervisor.
//!
//! Owns the backend process lifecycle: spawn with an isolated
//! environment, poll readiness until healthy or a fatal startup timeout,
//! run periodic health checks, and auto-restart after unexpected crashes
//! with a bounded, linearly increasing backoff. State transitions are
//! observable only through [`BridgeEvent::BackendStateChanged`] on the
//! shared event channel; no other component mutates supervisor state.

use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::client::BackendClient;
use crate::config::BackendConfig;
use crate::events::BridgeEvent;
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the spawned backend process.
///
/// Everything else is stripped via `env_clear()` before launch; extra
/// variables the backend needs are injected explicitly from
/// `backend.env` in the configuration.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "LC_ALL",
    "TMPDIR",
    "USER",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

// ── Process state ────────────────────────────────────────────────────────────

/// Lifecycle state of the supervised backend process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendProcessState {
    /// No process running and none being started.
    Stopped,
    /// Process spawned; waiting for the health endpoint to answer.
    Starting,
    /// Process healthy and serving.
    Running,
    /// Process crashed; waiting out the restart backoff.
    Restarting,
}

impl std::fmt::Display for BackendProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Restarting => "restarting",
        };
        f.write_str(name)
    }
}

// ── State cell ───────────────────────────────────────────────────────────────

/// Shared state holder: the supervisor and its monitor task both
/// transition through it so every change emits exactly one event.
#[derive(Clone)]
struct StateCell {
    state: Arc<Mutex<BackendProcessState>>,
    events: mpsc::Sender<BridgeEvent>,
}

impl StateCell {
    fn new(events: mpsc::Sender<BridgeEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendProcessState::Stopped)),
            events,
        }
    }

    fn get(&self) -> BackendProcessState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn set(&self, next: BackendProcessState) {
        {
            let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *guard == next {
                return;
            }
            *guard = next;
        }
        let _ = self
            .events
            .send(BridgeEvent::BackendStateChanged { state: next })
            .await;
    }

    async fn fatal(&self, reason: String) {
        let _ = self.events.send(BridgeEvent::BackendFatal { reason }).await;
    }
}

// ── Supervisor ───────────────────────────────────────────────────────────────

/// Handle for the monitor task of one supervised process lifetime.
struct MonitorHandle {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Backend process supervisor.
///
/// One instance supervises one backend process lifetime at a time.
/// `start` is fatal on a startup timeout — the caller, not the
/// supervisor, decides whether to try again.
pub struct Supervisor {
    config: BackendConfig,
    client: BackendClient,
    cell: StateCell,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl Supervisor {
    /// Construct a supervisor emitting events on `events`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Backend`] if the health-probe client cannot be
    /// built.
    pub fn new(config: BackendConfig, events: mpsc::Sender<BridgeEvent>) -> Result<Self> {
        let client = BackendClient::new(&config)?;
        Ok(Self {
            config,
            client,
            cell: StateCell::new(events),
            monitor: Mutex::new(None),
        })
    }

    /// Current process state.
    #[must_use]
    pub fn state(&self) -> BackendProcessState {
        self.cell.get()
    }

    /// Spawn the backend and wait until it is healthy.
    ///
    /// Polls the health endpoint every `readiness_poll` until success or
    /// the startup timeout elapses, at which point the process is killed
    /// and the error is returned — no automatic retry.
    ///
    /// # Errors
    ///
    /// - [`AppError::Backend`]`("already running …")` — `start` while not
    ///   stopped.
    /// - [`AppError::Backend`]`("spawn failed: …")` — OS-level spawn
    ///   failure.
    /// - [`AppError::Backend`]`("startup timeout …")` — the health
    ///   endpoint never answered within the window.
    pub async fn start(&self) -> Result<()> {
        if self.cell.get() != BackendProcessState::Stopped {
            return Err(AppError::Backend(format!(
                "already running (state: {})",
                self.cell.get()
            )));
        }

        self.cell.set(BackendProcessState::Starting).await;

        let mut child = spawn_backend_process(&self.config)?;
        info!(command = %self.config.command, "backend process spawned");

        if let Err(err) = wait_until_healthy(&self.client, &self.config).await {
            child.kill().await.ok();
            self.cell.set(BackendProcessState::Stopped).await;
            self.cell.fatal(err.to_string()).await;
            return Err(err);
        }

        self.cell.set(BackendProcessState::Running).await;
        info!("backend healthy");

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_monitor(
            self.config.clone(),
            self.client.clone(),
            self.cell.clone(),
            child,
            cancel.clone(),
        ));

        *self.monitor.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(MonitorHandle { handle, cancel });

        Ok(())
    }

    /// Stop the backend: graceful termination signal, a bounded wait,
    /// then a force-kill. Settles the monitor task before returning.
    pub async fn stop(&self) {
        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(MonitorHandle { handle, cancel }) = monitor {
            cancel.cancel();
            let _ = handle.await;
        }

        self.cell.set(BackendProcessState::Stopped).await;
    }
}

// ── Process spawn and readiness ──────────────────────────────────────────────

/// Spawn the backend process with a cleared environment plus the safe
/// allowlist and any configured extras.
fn spawn_backend_process(config: &BackendConfig) -> Result<Child> {
    let mut cmd = Command::new(&config.command);

    for arg in &config.args {
        cmd.arg(arg);
    }

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }
    for (key, val) in &config.env {
        cmd.env(key, val);
    }

    cmd.current_dir(&config.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    cmd.spawn()
        .map_err(|err| AppError::Backend(format!("spawn failed: {err}")))
}

/// Poll the health endpoint until success or the startup timeout.
async fn wait_until_healthy(client: &BackendClient, config: &BackendConfig) -> Result<()> {
    let deadline = tokio::time::Instant::now() + config.startup_timeout();

    loop {
        if client.health().await.is_ok() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AppError::Backend(format!(
                "startup timeout: health endpoint did not answer within {:?}",
                config.startup_timeout()
            )));
        }
        tokio::time::sleep(config.readiness_poll()).await;
    }
}

// ── Monitor task ─────────────────────────────────────────────────────────────

/// Monitor one supervisor lifetime: periodic health checks while the
/// process runs, bounded auto-restart after unexpected crashes, graceful
/// termination on cancellation.
///
/// Restart attempts accumulate across the whole lifetime — a successful
/// restart does not refund the budget.
async fn run_monitor(
    config: BackendConfig,
    client: BackendClient,
    cell: StateCell,
    mut child: Child,
    cancel: CancellationToken,
) {
    let mut restart_attempts: u32 = 0;

    /// What the monitor observed in one select round. The select
    /// expression must finish (dropping its borrow of the child) before
    /// the child can be terminated or replaced.
    enum Observation {
        Cancelled,
        Exited(Option<i32>),
        HealthDue,
    }

    loop {
        let observation = tokio::select! {
            () = cancel.cancelled() => Observation::Cancelled,

            status = child.wait() => {
                let code = match status {
                    Ok(s) => s.code(),
                    Err(err) => {
                        warn!(%err, "error waiting for backend process");
                        None
                    }
                };
                Observation::Exited(code)
            }

            () = tokio::time::sleep(config.health_interval()) => Observation::HealthDue,
        };

        match observation {
            Observation::Cancelled => {
                debug!("backend monitor: cancellation received");
                terminate(&mut child, config.stop_grace()).await;
                return;
            }

            Observation::Exited(Some(0)) => {
                info!("backend exited cleanly");
                cell.set(BackendProcessState::Stopped).await;
                return;
            }

            Observation::Exited(None) => {
                // Signal-terminated: deliberate kill, not a crash.
                warn!("backend terminated by signal; not restarting");
                cell.set(BackendProcessState::Stopped).await;
                return;
            }

            Observation::Exited(Some(exit_code)) => {
                warn!(exit_code, "backend crashed");
                match restart(&config, &client, &cell, &cancel, &mut restart_attempts).await {
                    Some(next) => child = next,
                    None => return,
                }
            }

            Observation::HealthDue => {
                if let Err(err) = client.health().await {
                    // Report-only: a failed check never stops the process.
                    warn!(%err, "periodic backend health check failed");
                    let _ = cell
                        .events
                        .send(BridgeEvent::BackendUnhealthy {
                            error: err.to_string(),
                        })
                        .await;
                }
            }
        }
    }
}

/// Attempt one restart after a crash. Returns the new child when the
/// backend came back healthy, or `None` when the budget is exhausted, a
/// respawn failed, or supervision was cancelled.
async fn restart(
    config: &BackendConfig,
    client: &BackendClient,
    cell: &StateCell,
    cancel: &CancellationToken,
    restart_attempts: &mut u32,
) -> Option<Child> {
    *restart_attempts += 1;
    let attempt = *restart_attempts;

    if attempt > config.max_restart_attempts {
        let reason = format!(
            "restart budget exhausted after {} attempts",
            config.max_restart_attempts
        );
        warn!(reason = reason.as_str(), "backend supervision giving up");
        cell.set(BackendProcessState::Stopped).await;
        cell.fatal(reason).await;
        return None;
    }

    cell.set(BackendProcessState::Restarting).await;
    let backoff = config.restart_backoff(attempt);
    info!(attempt, ?backoff, "restarting backend");

    tokio::select! {
        () = cancel.cancelled() => return None,
        () = tokio::time::sleep(backoff) => {}
    }

    cell.set(BackendProcessState::Starting).await;

    let mut child = match spawn_backend_process(config) {
        Ok(child) => child,
        Err(err) => {
            cell.set(BackendProcessState::Stopped).await;
            cell.fatal(format!("restart spawn failed: {err}")).await;
            return None;
        }
    };

    if let Err(err) = wait_until_healthy(client, config).await {
        child.kill().await.ok();
        cell.set(BackendProcessState::Stopped).await;
        cell.fatal(err.to_string()).await;
        return None;
    }

    cell.set(BackendProcessState::Running).await;
    info!(attempt, "backend restarted and healthy");
    Some(child)
}

// ── Graceful termination ─────────────────────────────────────────────────────

/// Gracefully terminate `child`: termination signal, wait up to `grace`,
/// then force-kill.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id().and_then(|p| i32::try_from(p).ok()) {
            let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), nix::sys::signal::Signal::SIGTERM);
        } else {
            let _ = child.start_kill();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => debug!("backend exited within the grace period"),
        Err(_) => {
            warn!("backend did not exit in time; force-killing");
            let _ = child.kill().await;
        }
    }
}
