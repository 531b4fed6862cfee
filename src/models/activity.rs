//! Activity events — one record per continuous focus interval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::window::WindowInfo;

/// Which producer created an activity event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    /// Browser extension via the framed stdio protocol.
    Browser,
    /// Window focus tracker.
    Desktop,
}

/// One continuous focus interval, immutable once created.
///
/// Wire form is camelCase to match the extension payloads the backend
/// ingests; fields the other producer does not populate stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Producer-assigned unique event id.
    pub event_id: String,
    /// Session the event belongs to; `None` when no session is active.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Producer of the event.
    pub source: ActivitySource,
    /// Free-form activity subtype (e.g. `page_view`, `window_focus`).
    #[serde(default)]
    pub activity_type: Option<String>,
    /// When the event was finalized.
    pub timestamp: DateTime<Utc>,
    /// Focus interval start.
    pub start_time: DateTime<Utc>,
    /// Focus interval end.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Page URL (browser events only).
    #[serde(default)]
    pub url: Option<String>,
    /// Page domain (browser events only).
    #[serde(default)]
    pub domain: Option<String>,
    /// Page or window title.
    #[serde(default)]
    pub title: Option<String>,
    /// Focused application name (desktop events only).
    #[serde(default)]
    pub app_name: Option<String>,
    /// Focused application executable path (desktop events only).
    #[serde(default)]
    pub app_path: Option<String>,
    /// Focused window title (desktop events only).
    #[serde(default)]
    pub window_title: Option<String>,
    /// Seconds of active engagement within the interval.
    #[serde(default)]
    pub active_time: i64,
    /// Seconds of idle time within the interval.
    #[serde(default)]
    pub idle_time: i64,
    /// Browser tab id (browser events only).
    #[serde(default)]
    pub tab_id: Option<i64>,
    /// Browser window id (browser events only).
    #[serde(default)]
    pub window_id: Option<i64>,
}

impl ActivityEvent {
    /// Build a desktop event from a flushed focus window.
    #[must_use]
    pub fn desktop(
        window: &WindowInfo,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        active_secs: i64,
        idle_secs: i64,
        session_id: Option<String>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            session_id,
            source: ActivitySource::Desktop,
            activity_type: Some("window_focus".into()),
            timestamp: end_time,
            start_time,
            end_time: Some(end_time),
            url: None,
            domain: None,
            title: Some(window.title.clone()),
            app_name: Some(window.app_name.clone()),
            app_path: window.app_path.clone(),
            window_title: Some(window.title.clone()),
            active_time: active_secs,
            idle_time: idle_secs,
            tab_id: None,
            window_id: Some(window.window_id),
        }
    }
}
