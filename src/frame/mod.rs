//! Length-prefixed framed message protocol.

pub mod codec;

pub use codec::{encode, Envelope, FrameCodec, MAX_FRAME_BYTES};
