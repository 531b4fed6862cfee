//! Integration tests for relay message dispatch against a scripted
//! backend.

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;

use focus_bridge::models::message::{ExtensionCommand, Reply};
use focus_bridge::relay::dispatch::dispatch;

use super::test_helpers::{browser_event, relay_state, spawn_mock_backend};

const LIVENESS: Duration = Duration::from_secs(60);

#[tokio::test]
async fn connect_creates_session_and_marks_connected() {
    let backend = spawn_mock_backend().await;
    let mut relay = relay_state(&backend.base_url, LIVENESS);

    let reply = dispatch(
        &relay.state,
        json!({"type": "connect", "userId": "user-7"}),
    )
    .await;

    match reply {
        Reply::Session {
            session_id, status, ..
        } => {
            assert_eq!(session_id, "session-1");
            assert_eq!(status, "active");
        }
        other => panic!("expected Reply::Session, got: {other:?}"),
    }

    assert!(relay.state.liveness.is_connected());
    assert_eq!(
        relay.session_rx.borrow().as_deref(),
        Some("session-1"),
        "the session id must be published to the tracker"
    );

    let event = relay.events.recv().await.expect("a connection event");
    assert!(
        matches!(
            event,
            focus_bridge::events::BridgeEvent::ExtensionConnected { ref session_id }
                if session_id == "session-1"
        ),
        "got: {event:?}"
    );

    relay.cancel.cancel();
}

#[tokio::test]
async fn second_connect_creates_a_new_session_and_later_batches_use_it() {
    let backend = spawn_mock_backend().await;
    let relay = relay_state(&backend.base_url, LIVENESS);

    let first = dispatch(&relay.state, json!({"type": "connect"})).await;
    assert!(matches!(first, Reply::Session { ref session_id, .. } if session_id == "session-1"));

    let second = dispatch(&relay.state, json!({"type": "connect"})).await;
    assert!(matches!(second, Reply::Session { ref session_id, .. } if session_id == "session-2"));

    assert_eq!(backend.sessions.load(Ordering::SeqCst), 2);

    // A subsequent batch is stamped with the most recent session only.
    let _ = dispatch(
        &relay.state,
        json!({"type": "activity_batch", "events": [browser_event("evt-1")]}),
    )
    .await;

    let batches = backend.batches.lock().expect("batch log");
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0]["events"][0]["sessionId"], "session-2",
        "events must carry the latest session id only"
    );

    relay.cancel.cancel();
}

#[tokio::test]
async fn empty_batch_is_acked_without_forwarding() {
    let backend = spawn_mock_backend().await;
    let relay = relay_state(&backend.base_url, LIVENESS);

    let reply = dispatch(&relay.state, json!({"type": "activity_batch", "events": []})).await;

    match reply {
        Reply::Ack {
            received_ids,
            received_count,
            ..
        } => {
            assert_eq!(received_ids, Some(Vec::new()));
            assert_eq!(received_count, Some(0));
        }
        other => panic!("expected Reply::Ack, got: {other:?}"),
    }

    assert!(
        backend.batches.lock().expect("batch log").is_empty(),
        "an empty batch must not reach the backend"
    );

    relay.cancel.cancel();
}

#[tokio::test]
async fn batch_replies_with_backend_assigned_ids() {
    let backend = spawn_mock_backend().await;
    let relay = relay_state(&backend.base_url, LIVENESS);

    let _ = dispatch(&relay.state, json!({"type": "connect"})).await;
    let reply = dispatch(
        &relay.state,
        json!({
            "type": "activity_batch",
            "events": [browser_event("evt-a"), browser_event("evt-b")]
        }),
    )
    .await;

    match reply {
        Reply::Ack {
            session_id,
            received_ids,
            received_count,
            ..
        } => {
            assert_eq!(session_id.as_deref(), Some("session-1"));
            assert_eq!(
                received_ids,
                Some(vec!["evt-a".to_owned(), "evt-b".to_owned()])
            );
            assert_eq!(received_count, Some(2));
        }
        other => panic!("expected Reply::Ack, got: {other:?}"),
    }

    relay.cancel.cancel();
}

#[tokio::test]
async fn batch_without_session_is_tagged_null_not_rejected() {
    let backend = spawn_mock_backend().await;
    let relay = relay_state(&backend.base_url, LIVENESS);

    let reply = dispatch(
        &relay.state,
        json!({"type": "activity_batch", "events": [browser_event("evt-1")]}),
    )
    .await;

    assert!(
        matches!(reply, Reply::Ack { ref session_id, .. } if session_id.is_none()),
        "got: {reply:?}"
    );

    let batches = backend.batches.lock().expect("batch log");
    assert!(
        batches[0]["events"][0]["sessionId"].is_null(),
        "events without a session must be forwarded with a null tag"
    );

    relay.cancel.cancel();
}

#[tokio::test]
async fn heartbeat_acks_without_prior_connect() {
    let backend = spawn_mock_backend().await;
    let relay = relay_state(&backend.base_url, LIVENESS);

    let reply = dispatch(&relay.state, json!({"type": "heartbeat"})).await;

    match reply {
        Reply::Ack {
            session_id,
            timestamp,
            received_ids,
            ..
        } => {
            assert!(session_id.is_none(), "no connect has happened yet");
            assert!(received_ids.is_none());
            let age = chrono::Utc::now() - timestamp;
            assert!(age.num_seconds() < 5, "timestamp must be current");
        }
        other => panic!("expected Reply::Ack, got: {other:?}"),
    }

    relay.cancel.cancel();
}

#[tokio::test]
async fn unknown_kind_gets_a_typed_error_reply() {
    let backend = spawn_mock_backend().await;
    let relay = relay_state(&backend.base_url, LIVENESS);

    let reply = dispatch(&relay.state, json!({"type": "wibble"})).await;

    match reply {
        Reply::Error { message, .. } => {
            assert!(
                message.contains("unrecognized message kind: wibble"),
                "got: {message}"
            );
        }
        other => panic!("expected Reply::Error, got: {other:?}"),
    }

    relay.cancel.cancel();
}

#[tokio::test]
async fn missing_discriminator_gets_an_error_reply() {
    let backend = spawn_mock_backend().await;
    let relay = relay_state(&backend.base_url, LIVENESS);

    let reply = dispatch(&relay.state, json!({"events": []})).await;
    assert!(
        matches!(reply, Reply::Error { ref message, .. } if message.contains("discriminator")),
        "got: {reply:?}"
    );

    relay.cancel.cancel();
}

#[tokio::test]
async fn connect_failure_leaves_state_untouched() {
    // Nothing listens on this port: session creation must fail.
    let mut relay = relay_state("http://127.0.0.1:9", LIVENESS);

    let reply = dispatch(&relay.state, json!({"type": "connect"})).await;

    assert!(
        matches!(reply, Reply::Error { ref message, .. } if message.contains("session create failed")),
        "got: {reply:?}"
    );
    assert!(
        !relay.state.liveness.is_connected(),
        "a failed connect must not mark the extension connected"
    );
    assert!(relay.session_rx.borrow().is_none());
    assert!(
        relay.events.try_recv().is_err(),
        "no state-change event may fire on a failed connect"
    );

    relay.cancel.cancel();
}

#[tokio::test]
async fn queued_commands_ride_the_next_replies_in_order() {
    let backend = spawn_mock_backend().await;
    let relay = relay_state(&backend.base_url, LIVENESS);

    relay.state.commands.push(ExtensionCommand::Pause);
    relay.state.commands.push(ExtensionCommand::Resume);

    let first = dispatch(&relay.state, json!({"type": "heartbeat"})).await;
    assert!(
        matches!(first, Reply::Ack { command: Some(ExtensionCommand::Pause), .. }),
        "first reply must carry the oldest command, got: {first:?}"
    );

    // Commands attach to replies of any kind, including errors.
    let second = dispatch(&relay.state, json!({"type": "wibble"})).await;
    assert!(
        matches!(second, Reply::Error { command: Some(ExtensionCommand::Resume), .. }),
        "got: {second:?}"
    );

    let third = dispatch(&relay.state, json!({"type": "heartbeat"})).await;
    assert!(
        matches!(third, Reply::Ack { command: None, .. }),
        "a drained queue must attach nothing, got: {third:?}"
    );

    relay.cancel.cancel();
}
