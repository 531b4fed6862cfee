//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Corrupt frame on the stdio protocol: bad length prefix, payload
    /// that is not valid JSON, or a missing message discriminator.
    Frame(String),
    /// Relay server unreachable or returned an unusable reply.
    Relay(String),
    /// Backend process or backend API failure.
    Backend(String),
    /// Window focus probe or tracker failure.
    Tracker(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Frame(msg) => write!(f, "frame: {msg}"),
            Self::Relay(msg) => write!(f, "relay: {msg}"),
            Self::Backend(msg) => write!(f, "backend: {msg}"),
            Self::Tracker(msg) => write!(f, "tracker: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

// Required by `tokio_util::codec::Decoder`, which funnels transport
// errors through `From<io::Error>`.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Frame(format!("malformed json: {err}"))
    }
}
