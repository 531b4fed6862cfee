//! JSONL protocol message log with daily file rotation.
//!
//! Every inbound and outbound protocol message is appended here for
//! diagnostics — the stdio channel itself is invisible to the operator.

use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::{AppError, Result};

/// Which direction a logged message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Extension → relay.
    Inbound,
    /// Relay → extension.
    Outbound,
}

/// One logged protocol message.
#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    timestamp: DateTime<Utc>,
    direction: Direction,
    kind: &'a str,
    payload: &'a Value,
}

/// Internal state protected by a mutex.
struct WriterState {
    current_date: NaiveDate,
    writer: BufWriter<fs::File>,
}

/// A daily-rotating JSONL message log writer.
///
/// Appends one JSON object per line to
/// `<log_dir>/messages-YYYY-MM-DD.jsonl`, opening a new file when the
/// calendar date changes between writes.
pub struct MessageLog {
    log_dir: PathBuf,
    state: Mutex<Option<WriterState>>,
}

impl MessageLog {
    /// Construct a log writer that stores files in `log_dir`.
    ///
    /// Creates `log_dir` and all parent directories if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the directory cannot be created.
    pub fn new(log_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&log_dir).map_err(|e| {
            AppError::Io(format!(
                "failed to create message log directory {}: {e}",
                log_dir.display()
            ))
        })?;
        Ok(Self {
            log_dir,
            state: Mutex::new(None),
        })
    }

    /// Append one message to today's log file.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the file cannot be opened or the
    /// entry cannot be written.
    pub fn record(&self, direction: Direction, kind: &str, payload: &Value) -> Result<()> {
        let entry = LogEntry {
            timestamp: Utc::now(),
            direction,
            kind,
            payload,
        };
        let today = entry.timestamp.date_naive();

        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let needs_rotation = guard.as_ref().is_none_or(|s| s.current_date != today);
        if needs_rotation {
            let new_writer = Self::open_for_date(&self.log_dir, today)?;
            *guard = Some(WriterState {
                current_date: today,
                writer: new_writer,
            });
        }

        if let Some(state) = guard.as_mut() {
            let line = serde_json::to_string(&entry)
                .map_err(|e| AppError::Io(format!("failed to serialize log entry: {e}")))?;
            if let Err(e) = writeln!(state.writer, "{line}") {
                warn!("failed to write message log entry: {e}");
                return Err(AppError::Io(format!("message log write failed: {e}")));
            }
            if let Err(e) = state.writer.flush() {
                warn!("failed to flush message log: {e}");
                return Err(AppError::Io(format!("message log flush failed: {e}")));
            }
        }

        Ok(())
    }

    fn open_for_date(log_dir: &Path, date: NaiveDate) -> Result<BufWriter<fs::File>> {
        let file_name = format!("messages-{date}.jsonl");
        let path = log_dir.join(file_name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                AppError::Io(format!("failed to open message log {}: {e}", path.display()))
            })?;
        Ok(BufWriter::new(file))
    }
}
