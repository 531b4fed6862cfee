//! Extension liveness watchdog.
//!
//! The upstream protocol has no disconnect handshake, so connectivity is
//! a time-based heuristic: any successfully handled message resets the
//! timer, and a full silence window flips "extension connected" to false
//! exactly once, emitting [`BridgeEvent::ExtensionDisconnected`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::BridgeEvent;

/// Spawn the watchdog task and return a handle for resetting it.
#[must_use]
pub fn spawn_liveness_timer(
    timeout: Duration,
    events: mpsc::Sender<BridgeEvent>,
    cancel: CancellationToken,
) -> LivenessHandle {
    let reset_notify = Arc::new(Notify::new());
    let connected = Arc::new(AtomicBool::new(false));

    let task_notify = Arc::clone(&reset_notify);
    let task_connected = Arc::clone(&connected);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("liveness watchdog cancelled");
                    return;
                }
                () = task_notify.notified() => {
                    // Traffic observed — re-arm the window.
                }
                () = tokio::time::sleep(timeout) => {
                    // The swap guarantees at most one disconnection event
                    // per silence window.
                    if task_connected.swap(false, Ordering::SeqCst) {
                        info!(?timeout, "liveness window elapsed; extension disconnected");
                        let _ = events.send(BridgeEvent::ExtensionDisconnected).await;
                    }
                }
            }
        }
    });

    LivenessHandle {
        reset_notify,
        connected,
        join_handle: Some(handle),
    }
}

/// Handle controlling the liveness watchdog.
pub struct LivenessHandle {
    reset_notify: Arc<Notify>,
    connected: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl LivenessHandle {
    /// Re-arm the silence window (call on every handled message).
    pub fn reset(&self) {
        self.reset_notify.notify_one();
    }

    /// Mark the extension connected. Returns `true` on a false→true
    /// transition so the caller can emit a connection event exactly once.
    pub fn set_connected(&self) -> bool {
        !self.connected.swap(true, Ordering::SeqCst)
    }

    /// Whether the extension is currently considered connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Await the watchdog task after cancellation.
    pub async fn await_completion(mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}
