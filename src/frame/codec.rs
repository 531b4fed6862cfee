//! Length-prefixed JSON codec for the extension stdio streams.
//!
//! Each frame is an unsigned 32-bit little-endian length prefix followed
//! by exactly that many bytes of UTF-8 JSON. The decoder buffers partial
//! frames across reads and yields complete messages in arrival order; a
//! payload that fails JSON parsing is consumed in full before the error is
//! returned, so frame boundaries survive a malformed message.
//!
//! # Usage
//!
//! Use [`FrameCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] (inbound) and
//! [`tokio_util::codec::FramedWrite`] (outbound).

use bytes::{Buf, BytesMut};
use serde::Serialize;
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::{AppError, Result};

/// Length prefix width in bytes.
const LEN_PREFIX_BYTES: usize = 4;

/// Maximum frame payload accepted by the codec: 1 MiB, the conventional
/// native-messaging message cap. A declared length above this limit means
/// the stream is corrupt and cannot be resynchronized.
pub const MAX_FRAME_BYTES: usize = 1_048_576;

/// A decoded frame: the message discriminator plus the full JSON value.
///
/// Kind-specific parsing happens downstream (see
/// [`crate::models::message::parse_inbound`]); keeping the raw value here
/// lets the relay host forward messages without re-encoding them.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Value of the required `type` discriminator field.
    pub kind: String,
    /// The complete decoded JSON object.
    pub value: Value,
}

/// Length-prefixed JSON codec for bidirectional extension streams.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Payload length of a frame whose prefix has been consumed but whose
    /// payload has not fully arrived yet.
    pending: Option<usize>,
    /// Set when the stream can no longer be resynchronized (length prefix
    /// out of range). Malformed payloads do NOT set this — their bytes
    /// are consumed and the stream continues.
    corrupt: bool,
}

impl FrameCodec {
    /// Create a new codec with no buffered state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a length prefix has been read but the payload is still
    /// incomplete. The relay host uses this to bound how long a partial
    /// frame may stall.
    #[must_use]
    pub fn mid_frame(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the stream is unrecoverable. Decoding errors while this
    /// is `false` are per-frame failures; frame boundaries are intact.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        self.corrupt
    }
}

impl Decoder for FrameCodec {
    type Item = Envelope;
    type Error = AppError;

    /// Decode the next complete frame from `src`.
    ///
    /// Returns `Ok(None)` while fewer than `4 + length` bytes are buffered
    /// — no partial message is ever surfaced.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                if src.len() < LEN_PREFIX_BYTES {
                    return Ok(None);
                }
                let mut prefix = [0u8; LEN_PREFIX_BYTES];
                prefix.copy_from_slice(&src[..LEN_PREFIX_BYTES]);
                let declared = u32::from_le_bytes(prefix);
                let len = match usize::try_from(declared) {
                    Ok(len) if len <= MAX_FRAME_BYTES => len,
                    _ => {
                        self.corrupt = true;
                        return Err(AppError::Frame(format!(
                            "frame too large: {declared} bytes exceeds {MAX_FRAME_BYTES}"
                        )));
                    }
                };
                src.advance(LEN_PREFIX_BYTES);
                src.reserve(len);
                self.pending = Some(len);
                len
            }
        };

        if src.len() < len {
            return Ok(None);
        }

        // Consume the payload before parsing so a malformed message does
        // not desynchronize subsequent frames.
        let payload = src.split_to(len);
        self.pending = None;
        parse_envelope(&payload).map(Some)
    }

    /// Decode at EOF: leftover bytes mean the stream ended mid-frame.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>> {
        match self.decode(src)? {
            Some(envelope) => Ok(Some(envelope)),
            None => {
                if src.is_empty() && self.pending.is_none() {
                    Ok(None)
                } else {
                    Err(AppError::Frame("truncated frame at end of stream".into()))
                }
            }
        }
    }
}

impl Encoder<Value> for FrameCodec {
    type Error = AppError;

    /// Encode `item` as `len_prefix || utf8(json)` into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Frame`] when the serialized payload exceeds
    /// [`MAX_FRAME_BYTES`].
    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<()> {
        let payload = serde_json::to_vec(&item)?;
        if payload.len() > MAX_FRAME_BYTES {
            return Err(AppError::Frame(format!(
                "frame too large: {} bytes exceeds {MAX_FRAME_BYTES}",
                payload.len()
            )));
        }
        let len = u32::try_from(payload.len())
            .map_err(|_| AppError::Frame("frame length exceeds u32 range".into()))?;
        dst.reserve(LEN_PREFIX_BYTES + payload.len());
        dst.extend_from_slice(&len.to_le_bytes());
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

/// Encode any serializable message into a standalone frame.
///
/// # Errors
///
/// Returns [`AppError::Frame`] when serialization fails or the payload
/// exceeds [`MAX_FRAME_BYTES`].
pub fn encode<T: Serialize>(message: &T) -> Result<BytesMut> {
    let value = serde_json::to_value(message)?;
    let mut buf = BytesMut::new();
    FrameCodec::new().encode(value, &mut buf)?;
    Ok(buf)
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Parse a complete payload into an [`Envelope`].
fn parse_envelope(payload: &[u8]) -> Result<Envelope> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| AppError::Frame(format!("malformed payload: {e}")))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Frame("missing message discriminator `type`".into()))?
        .to_owned();
    Ok(Envelope { kind, value })
}
