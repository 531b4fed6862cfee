//! Cross-component event channel and the shell-facing status snapshot.
//!
//! Components never mutate each other's state; every observable change is
//! emitted as a [`BridgeEvent`] on one shared `mpsc` channel. A single
//! coordinator task consumes the channel, logs each event, and maintains
//! the [`StatusSnapshot`] the shell reads over `GET /status`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::supervisor::BackendProcessState;

/// Events emitted by the relay server, supervisor, and tracker.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// Extension completed a `connect`; a session is now active.
    ExtensionConnected {
        /// Newly created session id.
        session_id: String,
    },
    /// Liveness window elapsed with no extension traffic.
    ExtensionDisconnected,
    /// Supervisor moved the backend process to a new state.
    BackendStateChanged {
        /// The state entered.
        state: BackendProcessState,
    },
    /// A periodic health check failed; the process is still running.
    BackendUnhealthy {
        /// Probe failure description.
        error: String,
    },
    /// Supervision gave up: startup timed out or the restart budget is
    /// exhausted. Operator attention required.
    BackendFatal {
        /// Terminal failure description.
        reason: String,
    },
    /// The tracker crossed into or out of system idle.
    IdleStateChanged {
        /// Whether the user is now idle.
        idle: bool,
    },
    /// The tracker finalized a focus interval.
    WindowFlushed {
        /// Application that held focus.
        app_name: String,
        /// Active seconds in the interval.
        active_secs: i64,
        /// Idle seconds folded into the interval.
        idle_secs: i64,
    },
}

/// Point-in-time view of bridge state for the shell.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Whether the extension is currently considered connected.
    pub extension_connected: bool,
    /// Current backend process state.
    pub backend_state: BackendProcessState,
    /// Active session id, if any.
    pub session_id: Option<String>,
    /// Whether the user is currently idle.
    pub idle: bool,
    /// When the last event was observed.
    pub last_event_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// Snapshot for a freshly started bridge: nothing connected yet.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            extension_connected: false,
            backend_state: BackendProcessState::Stopped,
            session_id: None,
            idle: false,
            last_event_at: None,
        }
    }

    /// Shell-facing extension status: `connected` or `waiting`.
    #[must_use]
    pub fn extension_status(&self) -> &'static str {
        if self.extension_connected {
            "connected"
        } else {
            "waiting"
        }
    }

    /// Shell-facing backend status: `online`, `starting`, or `offline`.
    #[must_use]
    pub fn backend_status(&self) -> &'static str {
        match self.backend_state {
            BackendProcessState::Running => "online",
            BackendProcessState::Starting | BackendProcessState::Restarting => "starting",
            BackendProcessState::Stopped => "offline",
        }
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}

/// Spawn the coordinator task that drains the event channel and keeps the
/// status snapshot current.
///
/// The task runs until the `CancellationToken` fires or the channel
/// closes. Returns a `JoinHandle` so the caller can await clean shutdown.
#[must_use]
pub fn spawn_event_consumer(
    mut rx: mpsc::Receiver<BridgeEvent>,
    status_tx: watch::Sender<StatusSnapshot>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    info!("event coordinator shutting down");
                    break;
                }
                maybe_event = rx.recv() => {
                    if let Some(e) = maybe_event { e } else {
                        info!("bridge event channel closed");
                        break;
                    }
                }
            };

            let now = Utc::now();
            status_tx.send_modify(|snapshot| {
                snapshot.last_event_at = Some(now);
                apply_event(snapshot, &event);
            });

            match event {
                BridgeEvent::ExtensionConnected { ref session_id } => {
                    info!(session_id, "extension connected");
                }
                BridgeEvent::ExtensionDisconnected => {
                    info!("extension disconnected (liveness window elapsed)");
                }
                BridgeEvent::BackendStateChanged { state } => {
                    info!(%state, "backend state changed");
                }
                BridgeEvent::BackendUnhealthy { ref error } => {
                    warn!(error = error.as_str(), "backend health check failed");
                }
                BridgeEvent::BackendFatal { ref reason } => {
                    warn!(reason = reason.as_str(), "backend supervision gave up");
                }
                BridgeEvent::IdleStateChanged { idle } => {
                    info!(idle, "idle state changed");
                }
                BridgeEvent::WindowFlushed {
                    ref app_name,
                    active_secs,
                    idle_secs,
                } => {
                    info!(app_name, active_secs, idle_secs, "window flushed");
                }
            }
        }
    })
}

/// Fold one event into the snapshot.
fn apply_event(snapshot: &mut StatusSnapshot, event: &BridgeEvent) {
    match event {
        BridgeEvent::ExtensionConnected { session_id } => {
            snapshot.extension_connected = true;
            snapshot.session_id = Some(session_id.clone());
        }
        BridgeEvent::ExtensionDisconnected => {
            snapshot.extension_connected = false;
        }
        BridgeEvent::BackendStateChanged { state } => {
            snapshot.backend_state = *state;
        }
        BridgeEvent::BackendFatal { .. } => {
            snapshot.backend_state = BackendProcessState::Stopped;
        }
        BridgeEvent::IdleStateChanged { idle } => {
            snapshot.idle = *idle;
        }
        BridgeEvent::BackendUnhealthy { .. } | BridgeEvent::WindowFlushed { .. } => {}
    }
}
