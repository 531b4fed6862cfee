//! Relay HTTP server.
//!
//! Loopback axum listener the stream relay host forwards extension
//! messages to, plus the shell-facing surfaces: a status snapshot and an
//! operator command endpoint.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backend::client::BackendClient;
use crate::events::{BridgeEvent, StatusSnapshot};
use crate::models::message::{ExtensionCommand, Reply};
use crate::models::session::Session;
use crate::relay::commands::CommandQueue;
use crate::relay::dispatch;
use crate::relay::liveness::LivenessHandle;
use crate::{AppError, Result};

/// Shared relay state. The session and connected flag are owned here
/// exclusively; other components observe them through events, the watch
/// channel, or the status snapshot.
pub struct RelayState {
    /// Client used to forward qualifying messages to the backend.
    pub backend: Arc<BackendClient>,
    /// Session created by the most recent successful `connect`.
    pub session: RwLock<Option<Session>>,
    /// Publishes the current session id to the tracker (read-only there).
    pub session_tx: watch::Sender<Option<String>>,
    /// Extension liveness watchdog handle.
    pub liveness: LivenessHandle,
    /// Pending operator commands, drained one per reply.
    pub commands: CommandQueue,
    /// Shared bridge event channel.
    pub events: mpsc::Sender<BridgeEvent>,
    /// Coordinator-maintained snapshot served on `GET /status`.
    pub status_rx: watch::Receiver<StatusSnapshot>,
}

impl RelayState {
    /// Current session id, if a session is active.
    #[must_use]
    pub fn current_session_id(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.session_id.clone())
    }

    /// Store a freshly created session and publish its id.
    pub fn install_session(&self, session: Session) {
        let session_id = session.session_id.clone();
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        let _ = self.session_tx.send(Some(session_id));
    }
}

/// Body of an operator `POST /command` request.
#[derive(Debug, Deserialize)]
struct CommandBody {
    /// Command token: `pause`, `resume`, or `clear_local`.
    command: String,
}

/// Build the relay router over shared state.
#[must_use]
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/message", post(handle_message))
        .route("/command", post(handle_command))
        .route("/status", get(handle_status))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the relay on `127.0.0.1:port` until the token fires.
///
/// # Errors
///
/// Returns [`AppError::Config`] if the listener cannot bind, and
/// [`AppError::Io`] on a fatal serve error.
pub async fn serve(state: Arc<RelayState>, port: u16, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind relay on {bind}: {err}")))?;

    info!(%bind, "relay server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
        })
        .await
        .map_err(|err| AppError::Io(format!("relay server error: {err}")))?;

    info!("relay server shut down");
    Ok(())
}

/// Handler for `GET /health` — liveness probe for the relay itself.
async fn health() -> &'static str {
    "ok"
}

/// Handler for `POST /message` — one protocol message per request.
async fn handle_message(
    State(state): State<Arc<RelayState>>,
    Json(body): Json<Value>,
) -> Json<Reply> {
    Json(dispatch::dispatch(&state, body).await)
}

/// Handler for `POST /command` — queue an operator command for the
/// extension.
async fn handle_command(
    State(state): State<Arc<RelayState>>,
    Json(body): Json<CommandBody>,
) -> impl IntoResponse {
    match ExtensionCommand::from_str(&body.command) {
        Ok(command) => {
            state.commands.push(command);
            info!(command = body.command.as_str(), "operator command queued");
            (StatusCode::OK, Json(json!({ "ok": true }))).into_response()
        }
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": err.to_string() })),
        )
            .into_response(),
    }
}

/// Handler for `GET /status` — the shell's state-snapshot interface.
async fn handle_status(State(state): State<Arc<RelayState>>) -> Json<Value> {
    let snapshot = state.status_rx.borrow().clone();
    Json(json!({
        "extension_connected": snapshot.extension_connected,
        "extension_status": snapshot.extension_status(),
        "backend_state": snapshot.backend_state,
        "backend_status": snapshot.backend_status(),
        "session_id": snapshot.session_id,
        "idle": snapshot.idle,
        "last_event_at": snapshot.last_event_at,
    }))
}
