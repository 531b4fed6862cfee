//! macOS focus probe via `osascript` and `ioreg`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::process::Command;

use crate::models::window::WindowInfo;
use crate::tracker::probe::FocusProbe;
use crate::{AppError, Result};

/// AppleScript returning `name\npid\ntitle` for the frontmost process.
const FRONTMOST_SCRIPT: &str = r#"
tell application "System Events"
    set p to first application process whose frontmost is true
    set appName to name of p
    set appPid to unix id of p
    try
        set winTitle to name of front window of p
    on error
        set winTitle to ""
    end try
end tell
return appName & linefeed & appPid & linefeed & winTitle
"#;

/// Focus probe backed by `osascript` (frontmost window) and `ioreg`
/// (HID idle time).
#[derive(Debug, Default)]
pub struct MacosProbe;

impl MacosProbe {
    /// Construct the macOS probe.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FocusProbe for MacosProbe {
    fn active_window(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<WindowInfo>>> + Send + '_>> {
        Box::pin(async {
            let output = Command::new("osascript")
                .arg("-e")
                .arg(FRONTMOST_SCRIPT)
                .output()
                .await
                .map_err(|err| AppError::Tracker(format!("osascript failed: {err}")))?;

            if !output.status.success() {
                // No frontmost process (login window, secure input).
                return Ok(None);
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let mut lines = stdout.lines();
            let app_name = lines.next().unwrap_or_default().trim().to_owned();
            let pid_text = lines.next().unwrap_or_default().trim();
            let title = lines.next().unwrap_or_default().trim().to_owned();

            if app_name.is_empty() {
                return Ok(None);
            }

            let process_id: i32 = pid_text
                .parse()
                .map_err(|_| AppError::Tracker(format!("unparseable frontmost pid: {pid_text}")))?;

            // System Events does not expose a stable window id, so the
            // process id stands in: switching windows within one app is
            // treated as a title change, not a window change.
            Ok(Some(WindowInfo {
                app_name,
                app_path: None,
                process_id,
                window_id: i64::from(process_id),
                title,
            }))
        })
    }

    fn idle_duration(&self) -> Pin<Box<dyn Future<Output = Result<Duration>> + Send + '_>> {
        Box::pin(async {
            let output = Command::new("ioreg")
                .args(["-c", "IOHIDSystem", "-d", "4"])
                .output()
                .await
                .map_err(|err| AppError::Tracker(format!("ioreg failed: {err}")))?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let nanos = stdout
                .lines()
                .find(|line| line.contains("HIDIdleTime"))
                .and_then(|line| line.rsplit('=').next())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| AppError::Tracker("HIDIdleTime not found in ioreg output".into()))?;

            Ok(Duration::from_nanos(nanos))
        })
    }
}
