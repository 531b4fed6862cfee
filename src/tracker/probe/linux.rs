//! Linux/X11 focus probe via `xdotool` and `xprintidle`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::process::Command;

use crate::models::window::WindowInfo;
use crate::tracker::probe::FocusProbe;
use crate::{AppError, Result};

/// Focus probe backed by `xdotool` (active window id, pid, title) and
/// `xprintidle` (idle milliseconds).
#[derive(Debug, Default)]
pub struct X11Probe;

impl X11Probe {
    /// Construct the X11 probe.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Run a command and return trimmed stdout, or `None` on a non-zero
/// exit (e.g. no active window).
async fn run(cmd: &str, args: &[&str]) -> Result<Option<String>> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .await
        .map_err(|err| AppError::Tracker(format!("{cmd} failed: {err}")))?;

    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_owned()))
}

impl FocusProbe for X11Probe {
    fn active_window(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<WindowInfo>>> + Send + '_>> {
        Box::pin(async {
            let Some(window_text) = run("xdotool", &["getactivewindow"]).await? else {
                return Ok(None);
            };
            let window_id: i64 = window_text.parse().map_err(|_| {
                AppError::Tracker(format!("unparseable window id: {window_text}"))
            })?;

            let pid_text = run("xdotool", &["getwindowpid", &window_text])
                .await?
                .unwrap_or_default();
            let process_id: i32 = pid_text
                .parse()
                .map_err(|_| AppError::Tracker(format!("unparseable window pid: {pid_text}")))?;

            let title = run("xdotool", &["getwindowname", &window_text])
                .await?
                .unwrap_or_default();

            // The process name is the most stable app identity X11 offers.
            let app_name = tokio::fs::read_to_string(format!("/proc/{process_id}/comm"))
                .await
                .map(|s| s.trim().to_owned())
                .unwrap_or_default();

            Ok(Some(WindowInfo {
                app_name,
                app_path: tokio::fs::read_link(format!("/proc/{process_id}/exe"))
                    .await
                    .ok()
                    .map(|p| p.to_string_lossy().into_owned()),
                process_id,
                window_id,
                title,
            }))
        })
    }

    fn idle_duration(&self) -> Pin<Box<dyn Future<Output = Result<Duration>> + Send + '_>> {
        Box::pin(async {
            let millis_text = run("xprintidle", &[])
                .await?
                .ok_or_else(|| AppError::Tracker("xprintidle returned no output".into()))?;
            let millis: u64 = millis_text.parse().map_err(|_| {
                AppError::Tracker(format!("unparseable idle milliseconds: {millis_text}"))
            })?;
            Ok(Duration::from_millis(millis))
        })
    }
}
