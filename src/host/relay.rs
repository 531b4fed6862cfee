//! Stream relay host loop.
//!
//! Sits on the upstream process's standard I/O: decodes each inbound
//! frame, forwards it as an HTTP POST to the relay server, and writes the
//! reply back as a frame. The upstream process receives exactly one reply
//! per request — when the relay is unreachable the host synthesizes a
//! kind-specific `error` reply instead of retrying.
//!
//! The read side drives [`FrameCodec`] by hand rather than through
//! `FramedRead`: partial-frame reassembly needs a bounded wait (a frame
//! whose declared length is never satisfied is a malformed frame), and
//! the deadline only applies while a frame is actually incomplete.

use bytes::BytesMut;
use futures_util::SinkExt;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::codec::{Decoder, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::frame::{Envelope, FrameCodec};
use crate::host::log::{Direction, MessageLog};
use crate::models::message::Reply;
use crate::{AppError, Result};

/// Initial read buffer capacity.
const READ_BUF_BYTES: usize = 8192;

/// Run the relay host over the given byte streams until EOF or
/// cancellation.
///
/// Generic over the streams so tests can drive it with in-memory pipes.
///
/// # Errors
///
/// Returns [`AppError::Frame`] when the stream becomes unrecoverable
/// (oversized length prefix, or a partial frame that stalls past the
/// configured wait) and [`AppError::Io`] on read/write failures. A clean
/// EOF returns `Ok(())` after the outbound sink is flushed.
pub async fn run_host<R, W>(
    reader: R,
    writer: W,
    http: reqwest::Client,
    config: &HostConfig,
    log: &MessageLog,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut reader = reader;
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::with_capacity(READ_BUF_BYTES);
    let mut framed_out = FramedWrite::new(writer, FrameCodec::new());

    info!(relay_url = config.relay_url.as_str(), "relay host started");

    loop {
        // Drain every complete frame currently buffered, in order.
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(envelope)) => {
                    handle_message(&http, config, log, &mut framed_out, envelope).await?;
                }
                Ok(None) => break,
                Err(err) => {
                    if codec.is_corrupt() {
                        warn!(%err, "unrecoverable framing error");
                        return Err(err);
                    }
                    // Malformed payload: the frame's bytes are consumed,
                    // boundaries are intact, the stream continues.
                    warn!(%err, "malformed frame dropped");
                }
            }
        }

        // Read more bytes. The partial-frame deadline applies only while
        // a frame's declared length is waiting to be satisfied.
        let read = tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("relay host: cancellation received");
                break;
            }

            result = bounded_read(&mut reader, &mut buf, &codec, config) => result?,
        };

        if read == 0 {
            if codec.mid_frame() || !buf.is_empty() {
                warn!("stream ended mid-frame; trailing bytes discarded");
            }
            debug!("relay host: end of input");
            break;
        }
    }

    // No dangling writes: settle the outbound sink before returning.
    framed_out
        .flush()
        .await
        .map_err(|err| AppError::Io(format!("failed to flush outbound stream: {err}")))?;
    info!("relay host stopped");
    Ok(())
}

/// Read into `buf`, bounding the wait while a partial frame is pending.
async fn bounded_read<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    codec: &FrameCodec,
    config: &HostConfig,
) -> Result<usize>
where
    R: AsyncRead + Unpin + Send,
{
    if codec.mid_frame() {
        match tokio::time::timeout(config.partial_frame_timeout(), reader.read_buf(buf)).await {
            Ok(result) => result.map_err(|err| AppError::Io(err.to_string())),
            Err(_elapsed) => Err(AppError::Frame(format!(
                "partial frame stalled: declared length not satisfied within {:?}",
                config.partial_frame_timeout()
            ))),
        }
    } else {
        reader
            .read_buf(buf)
            .await
            .map_err(|err| AppError::Io(err.to_string()))
    }
}

/// Forward one decoded message and write back exactly one reply frame.
async fn handle_message<W>(
    http: &reqwest::Client,
    config: &HostConfig,
    log: &MessageLog,
    framed_out: &mut FramedWrite<W, FrameCodec>,
    envelope: Envelope,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    if let Err(err) = log.record(Direction::Inbound, &envelope.kind, &envelope.value) {
        warn!(%err, "failed to log inbound message");
    }

    let reply = forward(http, config, &envelope).await;
    let reply_kind = reply
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned();

    if let Err(err) = log.record(Direction::Outbound, &reply_kind, &reply) {
        warn!(%err, "failed to log outbound message");
    }

    framed_out
        .send(reply)
        .await
        .map_err(|err| AppError::Io(format!("failed to write reply frame: {err}")))
}

/// POST the message to the relay and return its JSON reply, or a
/// synthesized kind-specific error reply on unreachability. Never
/// retries; the upstream retries on its own schedule.
async fn forward(http: &reqwest::Client, config: &HostConfig, envelope: &Envelope) -> Value {
    let response = http
        .post(&config.relay_url)
        .timeout(config.forward_timeout())
        .json(&envelope.value)
        .send()
        .await;

    match response {
        Ok(resp) => match resp.json::<Value>().await {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, kind = envelope.kind.as_str(), "unusable relay reply");
                synthesized_error_reply(&envelope.kind)
            }
        },
        Err(err) => {
            warn!(%err, kind = envelope.kind.as_str(), "relay unreachable");
            synthesized_error_reply(&envelope.kind)
        }
    }
}

/// Kind-specific error reply emitted when the relay cannot answer.
fn synthesized_error_reply(kind: &str) -> Value {
    let message = match kind {
        "connect" => "relay unavailable: session could not be established",
        "activity_batch" => "relay unavailable: activity batch was not delivered",
        "heartbeat" => "relay unavailable: heartbeat not acknowledged",
        _ => "relay unavailable: message not delivered",
    };
    serde_json::to_value(Reply::error(message)).unwrap_or_else(|_| {
        // Reply serialization is infallible in practice; keep the
        // one-reply-per-request contract even if it ever is not.
        serde_json::json!({ "type": "error", "message": message })
    })
}
