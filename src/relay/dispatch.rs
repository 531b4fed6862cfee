//! Per-kind dispatch for messages arriving on `POST /message`.
//!
//! | Kind             | Handling                                            |
//! |------------------|-----------------------------------------------------|
//! | `connect`        | Create a backend session, mark connected, reply `session` |
//! | `activity_batch` | Stamp events with the session id, forward, reply `ack` |
//! | `heartbeat`      | Reply `ack` with timestamp and session id           |
//! | *(unknown)*      | Reply `error`; does NOT reset the liveness timer    |
//!
//! Every reply, including errors, may carry one queued operator command —
//! the protocol is pull-based, so the next reply of any kind is the
//! earliest delivery opportunity.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::events::BridgeEvent;
use crate::frame::Envelope;
use crate::models::message::{
    parse_inbound, ActivityBatchRequest, ConnectRequest, InboundMessage, Reply,
};
use crate::relay::server::RelayState;

/// Dispatch one message body and produce exactly one reply.
pub async fn dispatch(state: &RelayState, body: Value) -> Reply {
    let reply = match body.get("type").and_then(Value::as_str) {
        None => Reply::error("missing message discriminator `type`"),
        Some(kind) => {
            let envelope = Envelope {
                kind: kind.to_owned(),
                value: body,
            };
            match parse_inbound(&envelope) {
                Err(err) => {
                    warn!(%err, kind = envelope.kind.as_str(), "malformed message body");
                    Reply::error(err.to_string())
                }
                Ok(message) => {
                    if message.counts_for_liveness() {
                        state.liveness.reset();
                    }
                    handle(state, message).await
                }
            }
        }
    };

    reply.with_command(state.commands.take())
}

/// Route a parsed message to its handler.
async fn handle(state: &RelayState, message: InboundMessage) -> Reply {
    match message {
        InboundMessage::Connect(req) => handle_connect(state, req).await,
        InboundMessage::ActivityBatch(req) => handle_batch(state, req).await,
        InboundMessage::Heartbeat(_) => {
            Reply::heartbeat_ack(state.current_session_id(), Utc::now())
        }
        InboundMessage::Unknown { kind } => {
            debug!(kind = kind.as_str(), "unrecognized message kind");
            Reply::error(format!("unrecognized message kind: {kind}"))
        }
    }
}

/// `connect`: request a session from the backend; on success store it,
/// mark the extension connected, and fire a connection event on the
/// false→true transition. On failure reply `error` with no state change.
async fn handle_connect(state: &RelayState, req: ConnectRequest) -> Reply {
    match state.backend.create_session(req.user_id.as_deref()).await {
        Ok(session) => {
            let session_id = session.session_id.clone();
            state.install_session(session);

            if state.liveness.set_connected() {
                let _ = state
                    .events
                    .send(BridgeEvent::ExtensionConnected {
                        session_id: session_id.clone(),
                    })
                    .await;
            }

            Reply::session(session_id)
        }
        Err(err) => {
            warn!(%err, "session create failed");
            Reply::error(format!("session create failed: {err}"))
        }
    }
}

/// `activity_batch`: empty batches get an empty ack; otherwise every
/// event is stamped with the current session id (or left untagged when
/// none is active) and the batch is forwarded. Forward failures become
/// `error` replies — the extension retries on its own schedule.
async fn handle_batch(state: &RelayState, mut req: ActivityBatchRequest) -> Reply {
    let session_id = state.current_session_id();

    if req.events.is_empty() {
        return Reply::batch_ack(session_id, Utc::now(), Vec::new());
    }

    for event in &mut req.events {
        event.session_id.clone_from(&session_id);
    }

    match state
        .backend
        .submit_batch(&req.events, req.extension_version.as_deref())
        .await
    {
        Ok(accepted) => {
            if let Some(errors) = &accepted.errors {
                warn!(
                    rejected = errors.len(),
                    accepted = accepted.received_count,
                    "backend rejected part of an activity batch"
                );
            }
            Reply::batch_ack(session_id, Utc::now(), accepted.received_ids)
        }
        Err(err) => {
            warn!(%err, "activity batch forward failed");
            Reply::error(format!("activity batch forward failed: {err}"))
        }
    }
}
