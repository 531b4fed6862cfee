//! Unit tests for the length-prefixed frame codec.
//!
//! Covers:
//! - single frames and multi-frame buffers decode in arrival order
//! - reassembly is invariant to how the byte stream is chunked
//! - no partial message is ever surfaced
//! - encode/decode round-trips a message to a deep-equal value
//! - malformed payloads are dropped without corrupting later frames
//! - oversized length prefixes mark the stream unrecoverable

use bytes::BytesMut;
use chrono::Utc;
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder};

use focus_bridge::frame::{encode, Envelope, FrameCodec, MAX_FRAME_BYTES};
use focus_bridge::models::message::Reply;
use focus_bridge::AppError;

/// Build the raw bytes for one frame around the given JSON payload.
fn frame_bytes(payload: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4 + payload.len());
    bytes.extend_from_slice(
        &u32::try_from(payload.len())
            .expect("test payload fits in u32")
            .to_le_bytes(),
    );
    bytes.extend_from_slice(payload.as_bytes());
    bytes
}

/// Decode every complete frame currently buffered.
fn drain(codec: &mut FrameCodec, buf: &mut BytesMut) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Some(envelope) = codec.decode(buf).expect("decode must succeed") {
        out.push(envelope);
    }
    out
}

#[test]
fn single_frame_decodes() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(&frame_bytes(r#"{"type":"heartbeat"}"#)[..]);

    let envelope = codec
        .decode(&mut buf)
        .expect("decode must succeed")
        .expect("a complete frame must be decoded");

    assert_eq!(envelope.kind, "heartbeat");
    assert_eq!(envelope.value, json!({"type": "heartbeat"}));
    assert!(buf.is_empty(), "no leftover bytes for a single exact frame");
}

#[test]
fn multiple_frames_in_one_read_decode_in_order() {
    let mut codec = FrameCodec::new();
    let mut bytes = frame_bytes(r#"{"type":"connect"}"#);
    bytes.extend_from_slice(&frame_bytes(r#"{"type":"heartbeat"}"#));
    bytes.extend_from_slice(&frame_bytes(r#"{"type":"activity_batch","events":[]}"#));
    let mut buf = BytesMut::from(&bytes[..]);

    let decoded = drain(&mut codec, &mut buf);

    let kinds: Vec<&str> = decoded.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(
        kinds,
        ["connect", "heartbeat", "activity_batch"],
        "frames must decode in arrival order"
    );
}

#[test]
fn reassembly_is_split_point_invariant() {
    let payloads = [
        r#"{"type":"connect","userId":"u-1"}"#,
        r#"{"type":"heartbeat"}"#,
        r#"{"type":"activity_batch","events":[]}"#,
    ];
    let mut stream = Vec::new();
    for p in &payloads {
        stream.extend_from_slice(&frame_bytes(p));
    }

    // Feed the identical byte stream under several chunking patterns;
    // each must yield exactly the same three messages in order.
    for chunk_size in [1, 2, 3, 5, 7, 16, 64, stream.len()] {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();

        for chunk in stream.chunks(chunk_size) {
            buf.extend_from_slice(chunk);
            decoded.extend(drain(&mut codec, &mut buf));
        }

        assert_eq!(
            decoded.len(),
            payloads.len(),
            "chunk size {chunk_size} must yield every frame"
        );
        let kinds: Vec<&str> = decoded.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(
            kinds,
            ["connect", "heartbeat", "activity_batch"],
            "chunk size {chunk_size} must preserve order"
        );
    }
}

#[test]
fn partial_frame_is_never_surfaced() {
    let mut codec = FrameCodec::new();
    let full = frame_bytes(r#"{"type":"heartbeat"}"#);

    // Everything except the final byte: not decodable yet.
    let mut buf = BytesMut::from(&full[..full.len() - 1]);
    assert!(
        codec.decode(&mut buf).expect("decode must not error").is_none(),
        "partial frame must not be surfaced"
    );
    assert!(codec.mid_frame(), "codec must report a frame in flight");

    // The final byte completes the frame.
    buf.extend_from_slice(&full[full.len() - 1..]);
    let envelope = codec
        .decode(&mut buf)
        .expect("decode must succeed")
        .expect("frame must decode once complete");
    assert_eq!(envelope.kind, "heartbeat");
    assert!(!codec.mid_frame());
}

#[test]
fn prefix_with_no_payload_bytes_waits() {
    let mut codec = FrameCodec::new();

    // A length prefix declaring 32 bytes with zero payload available.
    let mut buf = BytesMut::from(&32u32.to_le_bytes()[..]);
    assert!(
        codec.decode(&mut buf).expect("decode must not error").is_none(),
        "a frame must not decode before its declared length is buffered"
    );
    assert!(codec.mid_frame());
}

#[test]
fn encode_then_decode_round_trips() {
    let reply = Reply::batch_ack(
        Some("session-1".to_owned()),
        Utc::now(),
        vec!["evt-1".to_owned(), "evt-2".to_owned()],
    );

    let mut buf = encode(&reply).expect("encode must succeed");
    let mut codec = FrameCodec::new();
    let envelope = codec
        .decode(&mut buf)
        .expect("decode must succeed")
        .expect("encoded frame must decode");

    assert_eq!(envelope.kind, "ack");
    assert_eq!(
        envelope.value,
        serde_json::to_value(&reply).expect("reply must serialize"),
        "decode must deep-equal the original message"
    );
}

#[test]
fn encoder_writes_exact_length_prefix() {
    let value = json!({"type": "heartbeat", "timestamp": "2026-01-05T10:00:00Z"});
    let mut buf = BytesMut::new();
    FrameCodec::new()
        .encode(value.clone(), &mut buf)
        .expect("encode must succeed");

    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&buf[..4]);
    let declared = u32::from_le_bytes(prefix) as usize;

    assert_eq!(
        declared,
        buf.len() - 4,
        "length prefix must equal the payload byte length"
    );
    let parsed: serde_json::Value =
        serde_json::from_slice(&buf[4..]).expect("payload must be valid JSON");
    assert_eq!(parsed, value);
}

#[test]
fn malformed_payload_does_not_corrupt_later_frames() {
    let mut codec = FrameCodec::new();
    let mut bytes = frame_bytes("this is not json");
    bytes.extend_from_slice(&frame_bytes(r#"{"type":"heartbeat"}"#));
    let mut buf = BytesMut::from(&bytes[..]);

    // First frame fails to parse but its bytes are consumed.
    match codec.decode(&mut buf) {
        Err(AppError::Frame(msg)) => assert!(
            msg.contains("malformed payload"),
            "error must mention the malformed payload, got: {msg}"
        ),
        other => panic!("expected Err(AppError::Frame), got: {other:?}"),
    }
    assert!(!codec.is_corrupt(), "a malformed payload is recoverable");
    assert!(!codec.mid_frame());

    // The next frame decodes normally.
    let envelope = codec
        .decode(&mut buf)
        .expect("decode must succeed after a malformed frame")
        .expect("subsequent frame must decode");
    assert_eq!(envelope.kind, "heartbeat");
}

#[test]
fn missing_discriminator_is_a_frame_error() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from(&frame_bytes(r#"{"events":[]}"#)[..]);

    match codec.decode(&mut buf) {
        Err(AppError::Frame(msg)) => assert!(
            msg.contains("missing message discriminator"),
            "error must name the missing discriminator, got: {msg}"
        ),
        other => panic!("expected Err(AppError::Frame), got: {other:?}"),
    }
    assert!(!codec.is_corrupt());
}

#[test]
fn oversized_length_prefix_marks_stream_corrupt() {
    let mut codec = FrameCodec::new();
    let declared = u32::try_from(MAX_FRAME_BYTES + 1).expect("limit fits in u32");
    let mut buf = BytesMut::from(&declared.to_le_bytes()[..]);

    match codec.decode(&mut buf) {
        Err(AppError::Frame(msg)) => assert!(
            msg.contains("frame too large"),
            "error must mention the oversized frame, got: {msg}"
        ),
        other => panic!("expected Err(AppError::Frame), got: {other:?}"),
    }
    assert!(
        codec.is_corrupt(),
        "an out-of-range length prefix cannot be resynchronized"
    );
}

#[test]
fn decode_eof_rejects_truncated_frame() {
    let mut codec = FrameCodec::new();
    let full = frame_bytes(r#"{"type":"heartbeat"}"#);
    let mut buf = BytesMut::from(&full[..full.len() - 3]);

    // Mid-frame EOF is a truncation error, never a partial message.
    assert!(codec.decode(&mut buf).expect("buffering must not error").is_none());
    match codec.decode_eof(&mut buf) {
        Err(AppError::Frame(msg)) => {
            assert!(msg.contains("truncated"), "got: {msg}");
        }
        other => panic!("expected Err(AppError::Frame), got: {other:?}"),
    }
}
