//! Shared fixtures for integration tests: a scripted backend HTTP server
//! and a fully wired relay state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use focus_bridge::backend::BackendClient;
use focus_bridge::config::BackendConfig;
use focus_bridge::events::{BridgeEvent, StatusSnapshot};
use focus_bridge::relay::{spawn_liveness_timer, CommandQueue, RelayState};

/// Handle to a scripted in-process backend server.
pub struct MockBackend {
    /// Base URL of the bound server.
    pub base_url: String,
    /// Number of sessions created so far.
    pub sessions: Arc<AtomicUsize>,
    /// Every batch body received, in arrival order.
    pub batches: Arc<Mutex<Vec<Value>>>,
}

type MockState = (Arc<AtomicUsize>, Arc<Mutex<Vec<Value>>>);

/// Spawn a backend look-alike on an ephemeral loopback port. Sessions
/// are numbered `session-1`, `session-2`, … and batch submissions echo
/// the submitted event ids.
pub async fn spawn_mock_backend() -> MockBackend {
    let sessions = Arc::new(AtomicUsize::new(0));
    let batches = Arc::new(Mutex::new(Vec::new()));

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/session", post(create_session))
        .route("/api/activity/batch", post(receive_batch))
        .with_state((Arc::clone(&sessions), Arc::clone(&batches)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("mock backend must bind");
    let addr = listener.local_addr().expect("bound address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend {
        base_url: format!("http://{addr}"),
        sessions,
        batches,
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "app": "mock-backend"}))
}

async fn create_session(
    State((sessions, _)): State<MockState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let n = sessions.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({
        "session_id": format!("session-{n}"),
        "user_id": body.get("user_id").cloned().unwrap_or(Value::Null),
        "start_time": Utc::now().to_rfc3339(),
        "end_time": Value::Null,
        "status": "active",
        "activity_count": 0,
    }))
}

async fn receive_batch(
    State((_, batches)): State<MockState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let ids: Vec<String> = body["events"]
        .as_array()
        .map(|events| {
            events
                .iter()
                .filter_map(|e| e["eventId"].as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default();

    batches
        .lock()
        .expect("batch log mutex must not be poisoned")
        .push(body);

    Json(json!({
        "success": true,
        "received_count": ids.len(),
        "received_ids": ids,
        "errors": Value::Null,
    }))
}

/// Backend configuration pointed at `base_url`, with timings short
/// enough for tests.
pub fn backend_config(base_url: &str) -> BackendConfig {
    BackendConfig {
        command: "/bin/sh".to_owned(),
        args: vec!["-c".to_owned(), "sleep 30".to_owned()],
        working_dir: std::env::temp_dir(),
        base_url: base_url.to_owned(),
        env: HashMap::new(),
        startup_timeout_secs: 5,
        readiness_poll_ms: 50,
        health_interval_secs: 10,
        health_timeout_secs: 2,
        request_timeout_secs: 2,
        max_restart_attempts: 3,
        restart_backoff_step_secs: 0,
        stop_grace_secs: 5,
    }
}

/// A fully wired relay state plus the observation channels the tests
/// assert against.
pub struct TestRelay {
    pub state: Arc<RelayState>,
    pub events: mpsc::Receiver<BridgeEvent>,
    pub session_rx: watch::Receiver<Option<String>>,
    pub cancel: CancellationToken,
}

/// Build a relay state over the given backend URL with the given
/// liveness window. Must be called inside a tokio runtime.
pub fn relay_state(backend_url: &str, liveness_timeout: Duration) -> TestRelay {
    let backend = Arc::new(
        BackendClient::new(&backend_config(backend_url)).expect("backend client must build"),
    );
    let (event_tx, events) = mpsc::channel(32);
    let (session_tx, session_rx) = watch::channel(None);
    let (_status_tx, status_rx) = watch::channel(StatusSnapshot::initial());
    let cancel = CancellationToken::new();
    let liveness = spawn_liveness_timer(liveness_timeout, event_tx.clone(), cancel.clone());

    let state = Arc::new(RelayState {
        backend,
        session: RwLock::new(None),
        session_tx,
        liveness,
        commands: CommandQueue::new(),
        events: event_tx,
        status_rx,
    });

    TestRelay {
        state,
        events,
        session_rx,
        cancel,
    }
}

/// A browser activity event body in the extension's camelCase wire form.
pub fn browser_event(event_id: &str) -> Value {
    json!({
        "eventId": event_id,
        "source": "browser",
        "timestamp": "2026-01-05T10:00:00Z",
        "startTime": "2026-01-05T09:59:00Z",
        "endTime": "2026-01-05T10:00:00Z",
        "url": "https://example.com/page",
        "domain": "example.com",
        "title": "Example",
        "activeTime": 42,
        "idleTime": 3,
        "tabId": 7,
        "windowId": 2
    })
}
