//! Generic SSE (Server-Sent Events) line parser.
//!
//! Converts a chunked byte body into a `Stream<Item = SseEvent>`. Lines are
//! split on raw bytes so multi-byte characters straddling a chunk boundary
//! decode intact.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use tokio_stream::StreamExt;

use delve_core::error::{DelveError, Result};

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Parse a reqwest response body as an SSE stream.
pub fn parse_sse_response(response: reqwest::Response) -> impl Stream<Item = Result<SseEvent>> {
    parse_sse_stream(response.bytes_stream())
}

/// Parse any byte-chunk stream as SSE.
///
/// A transport error is yielded once as [`DelveError::Connection`] and ends
/// the stream.
pub fn parse_sse_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + 'static,
{
    futures::stream::unfold(
        SseState {
            byte_stream: Box::pin(byte_stream),
            buffer: Vec::new(),
            pending: PendingEvent::default(),
            finished: false,
        },
        |mut state| async move {
            if state.finished {
                return None;
            }
            loop {
                if let Some(newline_pos) = state.buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = state.buffer.drain(..=newline_pos).collect();
                    let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
                    let line = line.trim_end_matches('\r');

                    if line.is_empty() {
                        // Empty line = dispatch event
                        if let Some(event) = state.pending.take() {
                            return Some((Ok(event), state));
                        }
                        continue;
                    }
                    state.pending.feed(line);
                    continue;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        state.finished = true;
                        let err = DelveError::Connection(format!("SSE stream error: {e}"));
                        return Some((Err(err), state));
                    }
                    None => {
                        state.finished = true;
                        // Flush a trailing line without newline, then any open event.
                        if !state.buffer.is_empty() {
                            let raw = std::mem::take(&mut state.buffer);
                            let line = String::from_utf8_lossy(&raw);
                            state.pending.feed(line.trim_end_matches('\r'));
                        }
                        return state.pending.take().map(|event| (Ok(event), state));
                    }
                }
            }
        },
    )
}

type ByteStream<E> = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, E>> + Send>>;

struct SseState<E> {
    byte_stream: ByteStream<E>,
    buffer: Vec<u8>,
    pending: PendingEvent,
    finished: bool,
}

#[derive(Default)]
struct PendingEvent {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl PendingEvent {
    fn feed(&mut self, line: &str) {
        if line.starts_with(':') {
            // Comment, skip
            return;
        }
        if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            self.id = Some(value.trim_start().to_string());
        }
    }

    fn take(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            self.id = None;
            return None;
        }
        let event = SseEvent {
            event: self.event.take(),
            data: self.data.join("\n"),
            id: self.id.take(),
        };
        self.data.clear();
        Some(event)
    }
}
