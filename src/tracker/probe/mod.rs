//! OS focus and idle probing behind a single capability interface.
//!
//! The tracker depends only on [`FocusProbe`]; each target platform
//! provides one implementation, and tests substitute scripted probes.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::models::window::WindowInfo;
use crate::Result;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

mod unsupported;

/// Capability interface over the platform's window-manager queries.
pub trait FocusProbe: Send + Sync {
    /// The currently focused window, or `None` when no window has focus
    /// (locked screen, empty desktop).
    ///
    /// # Errors
    ///
    /// Returns [`crate::AppError::Tracker`] when the platform query tool
    /// fails; the tracker skips the tick rather than flushing on a
    /// transient probe failure.
    fn active_window(&self) -> Pin<Box<dyn Future<Output = Result<Option<WindowInfo>>> + Send + '_>>;

    /// How long the system has been without user input.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AppError::Tracker`] when the platform query tool
    /// fails.
    fn idle_duration(&self) -> Pin<Box<dyn Future<Output = Result<Duration>> + Send + '_>>;
}

/// The focus probe for the current platform.
#[must_use]
pub fn platform_probe() -> Box<dyn FocusProbe> {
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacosProbe::new())
    }
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::X11Probe::new())
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Box::new(unsupported::UnsupportedProbe::new())
    }
}

// Keep the fallback probe compiled on every platform so its contract is
// exercised by tests regardless of host OS.
pub use unsupported::UnsupportedProbe;
