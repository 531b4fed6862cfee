//! Protocol message envelope parsing and reply types.
//!
//! Inbound messages arrive as JSON objects with a required `type`
//! discriminator (`connect`, `activity_batch`, `heartbeat`). Kind-specific
//! fields are parsed per discriminator; an unrecognized discriminator is a
//! distinct parse result so the relay can answer it with a typed `error`
//! reply instead of failing the whole frame.
//!
//! Outbound replies carry the discriminators `session`, `ack`, and
//! `error`, each with an optional piggybacked operator [`ExtensionCommand`]
//! delivered opportunistically on the next reply of any kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::frame::Envelope;
use crate::models::activity::ActivityEvent;
use crate::{AppError, Result};

// ── Inbound messages ─────────────────────────────────────────────────────────

/// Fields of a `connect` message.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectRequest {
    /// Optional user to attribute the session to.
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
}

/// Fields of an `activity_batch` message.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityBatchRequest {
    /// Events in arrival order; may be empty.
    #[serde(default)]
    pub events: Vec<ActivityEvent>,
    /// Version string of the producing extension.
    #[serde(default, alias = "extensionVersion")]
    pub extension_version: Option<String>,
    /// When the batch was assembled.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Fields of a `heartbeat` message.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatRequest {
    /// Sender-side timestamp, if provided.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A parsed inbound protocol message.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// Session establishment request.
    Connect(ConnectRequest),
    /// Batch of browser activity events.
    ActivityBatch(ActivityBatchRequest),
    /// Liveness heartbeat.
    Heartbeat(HeartbeatRequest),
    /// Syntactically valid message with an unrecognized discriminator.
    Unknown {
        /// The unrecognized `type` value.
        kind: String,
    },
}

impl InboundMessage {
    /// Whether this message resets the extension liveness timer.
    ///
    /// Unknown discriminators deliberately do not count as liveness —
    /// they are indistinguishable from a foreign process writing to the
    /// stream.
    #[must_use]
    pub fn counts_for_liveness(&self) -> bool {
        !matches!(self, Self::Unknown { .. })
    }
}

/// Parse a decoded [`Envelope`] into a typed [`InboundMessage`].
///
/// # Errors
///
/// Returns [`AppError::Frame`] when a recognized kind is missing required
/// fields or carries fields of the wrong shape.
pub fn parse_inbound(envelope: &Envelope) -> Result<InboundMessage> {
    match envelope.kind.as_str() {
        "connect" => {
            let req: ConnectRequest = serde_json::from_value(envelope.value.clone())
                .map_err(|e| AppError::Frame(format!("invalid connect message: {e}")))?;
            Ok(InboundMessage::Connect(req))
        }
        "activity_batch" => {
            let req: ActivityBatchRequest = serde_json::from_value(envelope.value.clone())
                .map_err(|e| AppError::Frame(format!("invalid activity_batch message: {e}")))?;
            Ok(InboundMessage::ActivityBatch(req))
        }
        "heartbeat" => {
            let req: HeartbeatRequest = serde_json::from_value(envelope.value.clone())
                .map_err(|e| AppError::Frame(format!("invalid heartbeat message: {e}")))?;
            Ok(InboundMessage::Heartbeat(req))
        }
        other => Ok(InboundMessage::Unknown {
            kind: other.to_owned(),
        }),
    }
}

// ── Operator commands ────────────────────────────────────────────────────────

/// Operator command delivered to the extension on the next outbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionCommand {
    /// Pause browser-side capture.
    Pause,
    /// Resume browser-side capture.
    Resume,
    /// Clear the extension's locally buffered events.
    ClearLocal,
}

impl std::str::FromStr for ExtensionCommand {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "clear_local" => Ok(Self::ClearLocal),
            other => Err(AppError::Relay(format!("unknown command: {other}"))),
        }
    }
}

// ── Outbound replies ─────────────────────────────────────────────────────────

/// Outbound protocol reply; exactly one is produced per inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// Successful session establishment.
    Session {
        /// Backend-assigned session id.
        session_id: String,
        /// Session status (`active`).
        status: String,
        /// Piggybacked operator command, if one was queued.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<ExtensionCommand>,
    },
    /// Acknowledgement for heartbeats and activity batches.
    Ack {
        /// Current session id, when one is active.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        /// Server-side acknowledgement time.
        timestamp: DateTime<Utc>,
        /// Backend-assigned ids of accepted events (batch acks only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        received_ids: Option<Vec<String>>,
        /// Number of accepted events (batch acks only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        received_count: Option<usize>,
        /// Piggybacked operator command, if one was queued.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<ExtensionCommand>,
    },
    /// Typed failure reply; the stream continues after an error.
    Error {
        /// Human-readable failure description.
        message: String,
        /// Piggybacked operator command, if one was queued.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<ExtensionCommand>,
    },
}

impl Reply {
    /// Session reply for a successful `connect`.
    #[must_use]
    pub fn session(session_id: String) -> Self {
        Self::Session {
            session_id,
            status: "active".into(),
            command: None,
        }
    }

    /// Ack for a heartbeat: current time plus the active session id.
    #[must_use]
    pub fn heartbeat_ack(session_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self::Ack {
            session_id,
            timestamp: now,
            received_ids: None,
            received_count: None,
            command: None,
        }
    }

    /// Ack for an activity batch carrying the backend's accepted ids.
    #[must_use]
    pub fn batch_ack(
        session_id: Option<String>,
        now: DateTime<Utc>,
        received_ids: Vec<String>,
    ) -> Self {
        let received_count = received_ids.len();
        Self::Ack {
            session_id,
            timestamp: now,
            received_ids: Some(received_ids),
            received_count: Some(received_count),
            command: None,
        }
    }

    /// Error reply with the given message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            command: None,
        }
    }

    /// Attach a piggybacked operator command, replacing any present.
    #[must_use]
    pub fn with_command(mut self, cmd: Option<ExtensionCommand>) -> Self {
        match &mut self {
            Self::Session { command, .. }
            | Self::Ack { command, .. }
            | Self::Error { command, .. } => *command = cmd,
        }
        self
    }

    /// The reply's wire discriminator.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Session { .. } => "session",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
        }
    }
}
