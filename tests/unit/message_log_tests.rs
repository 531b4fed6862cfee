//! Unit tests for the JSONL protocol message log.

use chrono::Utc;
use serde_json::json;

use focus_bridge::host::{Direction, MessageLog};

#[test]
fn entries_append_as_jsonl_with_direction_and_kind() {
    let dir = tempfile::tempdir().expect("tempdir must be created");
    let log = MessageLog::new(dir.path().to_path_buf()).expect("log must initialize");

    log.record(Direction::Inbound, "connect", &json!({"type": "connect"}))
        .expect("inbound entry must be written");
    log.record(
        Direction::Outbound,
        "session",
        &json!({"type": "session", "session_id": "s-1"}),
    )
    .expect("outbound entry must be written");

    let file = dir
        .path()
        .join(format!("messages-{}.jsonl", Utc::now().date_naive()));
    let content = std::fs::read_to_string(&file).expect("today's log file must exist");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2, "one line per logged message");

    let first: serde_json::Value = serde_json::from_str(lines[0]).expect("line must be JSON");
    assert_eq!(first["direction"], "inbound");
    assert_eq!(first["kind"], "connect");
    assert!(first["timestamp"].is_string());

    let second: serde_json::Value = serde_json::from_str(lines[1]).expect("line must be JSON");
    assert_eq!(second["direction"], "outbound");
    assert_eq!(second["payload"]["session_id"], "s-1");
}

#[test]
fn log_directory_is_created_on_demand() {
    let dir = tempfile::tempdir().expect("tempdir must be created");
    let nested = dir.path().join("deep").join("logs");

    let log = MessageLog::new(nested.clone()).expect("nested directories must be created");
    log.record(Direction::Inbound, "heartbeat", &json!({"type": "heartbeat"}))
        .expect("entry must be written");

    assert!(nested.is_dir(), "log directory must exist");
}
