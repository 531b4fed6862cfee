//! Global configuration parsing and validation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Relay server settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RelayConfig {
    /// Loopback port the relay HTTP server binds to.
    #[serde(default = "default_relay_port")]
    pub http_port: u16,
    /// Seconds of protocol silence before the extension is declared
    /// disconnected.
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,
}

fn default_relay_port() -> u16 {
    8754
}

fn default_liveness_timeout() -> u64 {
    120
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http_port: default_relay_port(),
            liveness_timeout_secs: default_liveness_timeout(),
        }
    }
}

/// Backend process and backend API settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Backend executable (e.g. a bundled Python interpreter or binary).
    pub command: String,
    /// Arguments passed to the backend executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory the backend process starts in.
    pub working_dir: PathBuf,
    /// Base URL of the backend HTTP API.
    #[serde(default = "default_backend_base_url")]
    pub base_url: String,
    /// Extra environment variables injected into the backend process on
    /// top of the safe allowlist.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Seconds allowed for the backend to become healthy after spawn.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
    /// Milliseconds between readiness probes during startup.
    #[serde(default = "default_readiness_poll_ms")]
    pub readiness_poll_ms: u64,
    /// Seconds between periodic health checks once running.
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
    /// Seconds allowed for a single health probe.
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
    /// Seconds allowed for a generic backend request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Maximum automatic restarts after unexpected crashes.
    #[serde(default = "default_max_restarts")]
    pub max_restart_attempts: u32,
    /// Backoff step in seconds; attempt `n` waits `n × step`.
    #[serde(default = "default_restart_backoff_step")]
    pub restart_backoff_step_secs: u64,
    /// Seconds to wait after a graceful termination signal before the
    /// process is force-killed.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,
}

fn default_backend_base_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_readiness_poll_ms() -> u64 {
    500
}

fn default_health_interval() -> u64 {
    10
}

fn default_health_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_restarts() -> u32 {
    3
}

fn default_restart_backoff_step() -> u64 {
    2
}

fn default_stop_grace() -> u64 {
    5
}

/// Window focus tracker settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TrackerConfig {
    /// Milliseconds between focus polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Seconds of system inactivity before the user counts as idle.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,
    /// Minimum seconds a window must hold focus to produce an event.
    #[serde(default = "default_min_window_secs")]
    pub min_window_secs: u64,
    /// Applications whose focus belongs to the browser extension.
    /// Matched case-insensitively against the focused app name.
    #[serde(default = "default_browser_apps")]
    pub browser_apps: Vec<String>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_idle_threshold() -> u64 {
    60
}

fn default_min_window_secs() -> u64 {
    1
}

fn default_browser_apps() -> Vec<String> {
    [
        "Google Chrome",
        "Chromium",
        "Safari",
        "Firefox",
        "Microsoft Edge",
        "Brave Browser",
        "Arc",
        "Opera",
        "Vivaldi",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            idle_threshold_secs: default_idle_threshold(),
            min_window_secs: default_min_window_secs(),
            browser_apps: default_browser_apps(),
        }
    }
}

/// Stream relay host settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HostConfig {
    /// Relay server endpoint messages are forwarded to.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    /// Seconds allowed for one forwarded request before an error reply
    /// is synthesized.
    #[serde(default = "default_forward_timeout")]
    pub forward_timeout_secs: u64,
    /// Seconds a partially received frame may stall before the stream is
    /// considered corrupt.
    #[serde(default = "default_partial_frame_timeout")]
    pub partial_frame_timeout_secs: u64,
    /// Directory for the JSONL protocol message log.
    #[serde(default = "default_host_log_dir")]
    pub log_dir: PathBuf,
}

fn default_relay_url() -> String {
    format!("http://127.0.0.1:{}/message", default_relay_port())
}

fn default_forward_timeout() -> u64 {
    5
}

fn default_partial_frame_timeout() -> u64 {
    30
}

fn default_host_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            forward_timeout_secs: default_forward_timeout(),
            partial_frame_timeout_secs: default_partial_frame_timeout(),
            log_dir: default_host_log_dir(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Relay server settings.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Backend process and API settings.
    pub backend: BackendConfig,
    /// Window focus tracker settings.
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Stream relay host settings.
    #[serde(default)]
    pub host: HostConfig,
}

impl GlobalConfig {
    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the TOML is invalid or a value
    /// fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.backend.command.trim().is_empty() {
            return Err(AppError::Config("backend.command must not be empty".into()));
        }
        if self.backend.readiness_poll_ms == 0 {
            return Err(AppError::Config(
                "backend.readiness_poll_ms must be greater than zero".into(),
            ));
        }
        if self.backend.startup_timeout_secs == 0 {
            return Err(AppError::Config(
                "backend.startup_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.relay.liveness_timeout_secs == 0 {
            return Err(AppError::Config(
                "relay.liveness_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.tracker.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "tracker.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.tracker.idle_threshold_secs == 0 {
            return Err(AppError::Config(
                "tracker.idle_threshold_secs must be greater than zero".into(),
            ));
        }
        if self.host.forward_timeout_secs == 0 {
            return Err(AppError::Config(
                "host.forward_timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl BackendConfig {
    /// Startup readiness deadline.
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Interval between readiness probes during startup.
    #[must_use]
    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    /// Interval between periodic health checks.
    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    /// Per-probe health check timeout.
    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    /// Generic request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Grace period between the termination signal and a force-kill.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    /// Backoff before restart `attempt` (1-based): `attempt × step`.
    #[must_use]
    pub fn restart_backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(u64::from(attempt) * self.restart_backoff_step_secs)
    }
}

impl TrackerConfig {
    /// Focus poll cadence.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// System inactivity threshold.
    #[must_use]
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    /// Minimum tracked duration for a window to produce an event.
    #[must_use]
    pub fn min_window(&self) -> Duration {
        Duration::from_secs(self.min_window_secs)
    }

    /// Whether `app_name` belongs to the browser set whose focus is the
    /// extension's responsibility.
    #[must_use]
    pub fn is_browser_app(&self, app_name: &str) -> bool {
        self.browser_apps
            .iter()
            .any(|b| b.eq_ignore_ascii_case(app_name))
    }
}

impl HostConfig {
    /// Per-forward request timeout.
    #[must_use]
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }

    /// Maximum wait for the remainder of a partially received frame.
    #[must_use]
    pub fn partial_frame_timeout(&self) -> Duration {
        Duration::from_secs(self.partial_frame_timeout_secs)
    }
}
