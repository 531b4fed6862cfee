//! Tracking session bound to one extension connection lifetime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is live and events are being attributed to it.
    Active,
    /// Session has been closed.
    Ended,
}

/// Correlation identifier binding activity events to one extension
/// connection lifetime. Created by the backend on `connect`, held by the
/// relay server, and read-only everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Backend-assigned session identifier.
    pub session_id: String,
    /// Optional user the session belongs to.
    #[serde(default)]
    pub user_id: Option<String>,
    /// When the session was created.
    pub started_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: SessionStatus,
}

impl Session {
    /// Construct an active session from a backend session-create reply.
    #[must_use]
    pub fn active(session_id: String, user_id: Option<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id,
            user_id,
            started_at,
            status: SessionStatus::Active,
        }
    }
}
