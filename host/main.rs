#![forbid(unsafe_code)]

//! `focus-bridge-host` — native-messaging host companion for
//! `focus-bridge`.
//!
//! Launched by the browser for each extension connection. Speaks the
//! length-prefixed framed protocol on stdin/stdout and forwards every
//! message to the relay server over loopback HTTP.
//!
//! All tracing goes to **stderr**: stdout carries protocol bytes.

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use focus_bridge::config::{GlobalConfig, HostConfig};
use focus_bridge::host::{run_host, MessageLog};
use focus_bridge::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "focus-bridge-host",
    about = "Native-messaging host for the focus-bridge relay",
    version,
    long_about = None
)]
struct Cli {
    /// Optional TOML configuration file (the daemon's config is reused;
    /// only the `[host]` section applies here).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Relay endpoint override (e.g. `http://127.0.0.1:8754/message`).
    #[arg(long)]
    relay_url: Option<String>,

    /// Message log directory override.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Forward timeout override, in seconds.
    #[arg(long)]
    forward_timeout_secs: Option<u64>,

    /// Partial-frame timeout override, in seconds.
    #[arg(long)]
    partial_frame_timeout_secs: Option<u64>,
}

impl Cli {
    /// Resolve the effective host configuration: file first, then CLI
    /// overrides on top, defaults when neither is given.
    fn effective_config(&self) -> Result<HostConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
                GlobalConfig::from_toml_str(&text)?.host
            }
            None => HostConfig::default(),
        };

        if let Some(url) = &self.relay_url {
            config.relay_url.clone_from(url);
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir.clone_from(dir);
        }
        if let Some(secs) = self.forward_timeout_secs {
            config.forward_timeout_secs = secs;
        }
        if let Some(secs) = self.partial_frame_timeout_secs {
            config.partial_frame_timeout_secs = secs;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = args.effective_config()?;
    let log = MessageLog::new(config.log_dir.clone())?;

    let http = reqwest::Client::builder()
        .build()
        .map_err(|err| AppError::Relay(format!("failed to build http client: {err}")))?;

    // The browser closes our stdin when the extension disconnects; the
    // signal handler only covers operator interruption.
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal_ct.cancel();
    });

    info!(relay_url = config.relay_url.as_str(), "starting relay host");
    run_host(
        tokio::io::stdin(),
        tokio::io::stdout(),
        http,
        &config,
        &log,
        ct,
    )
    .await
}

fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
