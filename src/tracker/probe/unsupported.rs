//! Fallback probe for platforms without a window-query implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::warn;

use crate::models::window::WindowInfo;
use crate::tracker::probe::FocusProbe;
use crate::Result;

/// Probe that reports no focused window and zero idle time.
///
/// Keeps the tracker loop harmless on platforms without an
/// implementation: nothing is ever tracked, nothing is ever flushed.
#[derive(Debug, Default)]
pub struct UnsupportedProbe;

impl UnsupportedProbe {
    /// Construct the fallback probe, warning once that window tracking
    /// is unavailable.
    #[must_use]
    pub fn new() -> Self {
        warn!("window focus tracking is not supported on this platform");
        Self
    }
}

impl FocusProbe for UnsupportedProbe {
    fn active_window(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<WindowInfo>>> + Send + '_>> {
        Box::pin(async { Ok(None) })
    }

    fn idle_duration(&self) -> Pin<Box<dyn Future<Output = Result<Duration>> + Send + '_>> {
        Box::pin(async { Ok(Duration::ZERO) })
    }
}
