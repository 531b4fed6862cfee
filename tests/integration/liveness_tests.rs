//! Integration tests for the extension liveness watchdog.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use focus_bridge::events::BridgeEvent;
use focus_bridge::relay::dispatch::dispatch;
use focus_bridge::relay::spawn_liveness_timer;

use super::test_helpers::{relay_state, spawn_mock_backend};

#[tokio::test]
async fn silence_flips_connected_exactly_once() {
    let (event_tx, mut events) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let liveness = spawn_liveness_timer(Duration::from_millis(150), event_tx, cancel.clone());

    assert!(liveness.set_connected(), "first mark is a transition");

    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("disconnection must fire within the window")
        .expect("channel must stay open");
    assert!(matches!(event, BridgeEvent::ExtensionDisconnected));
    assert!(!liveness.is_connected());

    // Further silence produces no second disconnection event.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(
        events.try_recv().is_err(),
        "the silence window must fire at most once per connection"
    );

    cancel.cancel();
    liveness.await_completion().await;
}

#[tokio::test]
async fn resets_defer_the_disconnect() {
    let (event_tx, mut events) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let liveness = spawn_liveness_timer(Duration::from_millis(500), event_tx, cancel.clone());

    liveness.set_connected();

    // Keep traffic flowing faster than the window: no disconnect.
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        liveness.reset();
    }
    assert!(
        events.try_recv().is_err(),
        "resets within the window must keep the extension connected"
    );
    assert!(liveness.is_connected());

    // Then stop the traffic: the disconnect fires.
    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("disconnection must fire after the final reset")
        .expect("channel must stay open");
    assert!(matches!(event, BridgeEvent::ExtensionDisconnected));

    cancel.cancel();
    liveness.await_completion().await;
}

#[tokio::test]
async fn set_connected_reports_the_transition_only_once() {
    let (event_tx, _events) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let liveness = spawn_liveness_timer(Duration::from_secs(60), event_tx, cancel.clone());

    assert!(liveness.set_connected());
    assert!(
        !liveness.set_connected(),
        "repeat connects must not look like new transitions"
    );

    cancel.cancel();
    liveness.await_completion().await;
}

#[tokio::test]
async fn unknown_kinds_do_not_keep_the_extension_alive() {
    let backend = spawn_mock_backend().await;
    let mut relay = relay_state(&backend.base_url, Duration::from_millis(300));

    let _ = dispatch(&relay.state, json!({"type": "connect"})).await;
    let connected = relay.events.recv().await.expect("connection event");
    assert!(matches!(connected, BridgeEvent::ExtensionConnected { .. }));

    // Spam unrecognized kinds more often than the window. They get
    // error replies but deliberately do not reset the watchdog.
    let disconnect = async {
        loop {
            if let Some(BridgeEvent::ExtensionDisconnected) = relay.events.recv().await {
                break;
            }
        }
    };
    let spam = async {
        loop {
            let _ = dispatch(&relay.state, json!({"type": "wibble"})).await;
            tokio::time::sleep(Duration::from_millis(80)).await;
        }
    };

    tokio::select! {
        () = disconnect => {}
        () = spam => unreachable!("spam loop never completes"),
        () = tokio::time::sleep(Duration::from_secs(3)) => {
            panic!("unknown kinds must not defer the disconnect");
        }
    }

    assert!(!relay.state.liveness.is_connected());
    relay.cancel.cancel();
}

#[tokio::test]
async fn heartbeats_do_keep_the_extension_alive() {
    let backend = spawn_mock_backend().await;
    let mut relay = relay_state(&backend.base_url, Duration::from_millis(500));

    let _ = dispatch(&relay.state, json!({"type": "connect"})).await;
    let _ = relay.events.recv().await;

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = dispatch(&relay.state, json!({"type": "heartbeat"})).await;
    }

    assert!(
        relay.events.try_recv().is_err(),
        "heartbeat traffic within the window must prevent the disconnect"
    );
    assert!(relay.state.liveness.is_connected());

    relay.cancel.cancel();
}
