//! Line-framed stream relay.
//!
//! # States
//! ```text
//! Streaming ──EOF──────────────▶ Completed
//!     │──read error───────────▶ UpstreamError       (emits one proxy_error event)
//!     └──relay dropped early──▶ ClientDisconnected
//! ```
//!
//! The relay owns the upstream source. Every transition out of `Streaming`
//! goes through [`StreamRelay::release`], which drops the source exactly once.
//! Dropping the relay while still streaming (hyper drops the response body
//! when the client goes away) counts as a client disconnect.
//!
//! Lines are split on `\n` bytes and never decoded, so any text encoding or
//! binary payload relays unchanged apart from line endings.

use std::convert::Infallible;
use std::fmt::Display;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Bytes;
use futures_util::{stream::BoxStream, Stream, StreamExt, TryStreamExt};
use tokio_util::{
    codec::{AnyDelimiterCodec, FramedRead},
    io::StreamReader,
};

use crate::observability::metrics;
use crate::relay::error::RelayError;

/// Upstream body as a stream of frames, already split according to [`Framing`].
pub type UpstreamFrames = BoxStream<'static, io::Result<Bytes>>;

/// How the upstream body is cut into chunks for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One chunk per line, re-terminated with `\n`.
    Lines,
    /// Chunks forwarded as received. Used for content-encoded bodies, where
    /// newline bytes carry no meaning.
    Passthrough,
}

/// Splits an upstream response body for relaying.
///
/// With [`Framing::Lines`], lines longer than `max_line_bytes` surface as a read
/// error.
pub fn upstream_frames(response: reqwest::Response, framing: Framing, max_line_bytes: usize) -> UpstreamFrames {
    let bytes = response.bytes_stream().map_err(io::Error::other).boxed();
    match framing {
        Framing::Lines => split_lines(bytes, max_line_bytes),
        Framing::Passthrough => bytes,
    }
}

fn split_lines(bytes: UpstreamFrames, max_line_bytes: usize) -> UpstreamFrames {
    let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_line_bytes);
    FramedRead::new(StreamReader::new(bytes), codec)
        .map_err(io::Error::other)
        .boxed()
}

/// Lifecycle of one relayed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Lines are being moved from upstream to the client.
    Streaming,
    /// Upstream reached end of stream.
    Completed,
    /// Reading from upstream failed mid-stream.
    UpstreamError,
    /// The client stopped receiving before upstream finished.
    ClientDisconnected,
}

impl RelayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayState::Streaming => "streaming",
            RelayState::Completed => "completed",
            RelayState::UpstreamError => "upstream_error",
            RelayState::ClientDisconnected => "client_disconnected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayState::Streaming)
    }
}

/// Moves upstream frames to the client.
pub struct StreamRelay<S> {
    upstream: Option<S>,
    framing: Framing,
    state: RelayState,
    target: String,
    started: Instant,
    lines: u64,
}

impl<S, E> StreamRelay<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    /// Takes ownership of the upstream source and enters `Streaming`.
    pub fn new(upstream: S, framing: Framing, target: impl Into<String>) -> Self {
        let target = target.into();
        tracing::debug!(target_url = %target, "Stream relay started");
        metrics::stream_started();
        Self {
            upstream: Some(upstream),
            framing,
            state: RelayState::Streaming,
            target,
            started: Instant::now(),
            lines: 0,
        }
    }
}

impl<S> StreamRelay<S> {
    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Whether the upstream source has been dropped.
    pub fn is_released(&self) -> bool {
        self.upstream.is_none()
    }

    /// Drops the upstream source and records the terminal state, once.
    fn release(&mut self, outcome: RelayState) {
        let Some(upstream) = self.upstream.take() else {
            return;
        };
        drop(upstream);
        self.state = outcome;

        let elapsed = self.started.elapsed();
        match outcome {
            RelayState::Completed => tracing::info!(
                target_url = %self.target,
                lines = self.lines,
                elapsed_ms = elapsed.as_millis() as u64,
                "Upstream stream completed"
            ),
            _ => tracing::warn!(
                target_url = %self.target,
                lines = self.lines,
                elapsed_ms = elapsed.as_millis() as u64,
                outcome = outcome.as_str(),
                "Upstream stream ended early"
            ),
        }
        metrics::stream_released(outcome.as_str(), elapsed);
    }
}

/// In-band terminal event sent when upstream fails after the head is committed.
pub fn proxy_error_event(detail: &str) -> Bytes {
    let body = RelayError::UpstreamStreamFailure(detail.to_string()).body();
    let payload = serde_json::to_string(&body)
        .unwrap_or_else(|_| r#"{"error":"upstream_stream_failed"}"#.to_string());
    Bytes::from(format!("event: proxy_error\ndata: {payload}\n\n"))
}

/// Re-terminates one line with `\n`, dropping a trailing `\r`.
fn terminate_line(line: &[u8]) -> Bytes {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let mut out = Vec::with_capacity(line.len() + 1);
    out.extend_from_slice(line);
    out.push(b'\n');
    Bytes::from(out)
}

impl<S, E> Stream for StreamRelay<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(upstream) = this.upstream.as_mut() else {
            return Poll::Ready(None);
        };

        match upstream.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(frame))) => {
                this.lines += 1;
                let chunk = match this.framing {
                    Framing::Lines => terminate_line(&frame),
                    Framing::Passthrough => frame,
                };
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                let detail = e.to_string();
                tracing::error!(target_url = %this.target, error = %detail, "Upstream read failed mid-stream");
                this.release(RelayState::UpstreamError);
                Poll::Ready(Some(Ok(proxy_error_event(&detail))))
            }
            Poll::Ready(None) => {
                this.release(RelayState::Completed);
                Poll::Ready(None)
            }
        }
    }
}

impl<S> Drop for StreamRelay<S> {
    fn drop(&mut self) {
        if self.upstream.is_some() {
            self.release(RelayState::ClientDisconnected);
        }
    }
}
