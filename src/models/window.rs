//! Focused-window identity as reported by the platform probe.

use serde::{Deserialize, Serialize};

/// Identity and title of the currently focused OS window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    /// Application name (e.g. `Terminal`).
    pub app_name: String,
    /// Executable path, when the platform exposes it.
    #[serde(default)]
    pub app_path: Option<String>,
    /// OS process id of the window owner.
    pub process_id: i32,
    /// Platform window identifier.
    pub window_id: i64,
    /// Window title at poll time.
    pub title: String,
}

impl WindowInfo {
    /// Whether `other` is the same window: window id AND process id match.
    /// Title changes alone do not constitute a new window.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.window_id == other.window_id && self.process_id == other.process_id
    }
}
