//! Delta normalizer: raw stream deltas to [`GenEvent`]s.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::Stream;
use pin_project_lite::pin_project;

use delve_core::error::{DelveError, Result};

use crate::RawDelta;

/// Normalized generation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenEvent {
    AssistantResponse {
        content: String,
    },
    /// A tool-call fragment. `id` and `name` are set on the first fragment of
    /// a call and usually absent afterwards; consumers track the open call.
    ToolCall {
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
}

/// Normalize one delta.
///
/// Tool-call data takes precedence over text. Role-only and finish-only
/// deltas carry no payload and yield `None`; any other delta without text or
/// tool-call data is a protocol violation.
pub fn normalize_delta(delta: RawDelta) -> Result<Option<GenEvent>> {
    if let Some(fragment) = delta.tool_call {
        return Ok(Some(GenEvent::ToolCall {
            id: fragment.id.filter(|id| !id.is_empty()),
            name: fragment.name.filter(|name| !name.is_empty()),
            arguments: fragment.arguments.unwrap_or_default(),
        }));
    }
    if let Some(content) = delta.content {
        return Ok(Some(GenEvent::AssistantResponse { content }));
    }
    if delta.role.is_some() || delta.finish_reason.is_some() {
        return Ok(None);
    }
    Err(DelveError::MalformedDelta(
        "delta carries neither content nor tool_calls".into(),
    ))
}

pin_project! {
    /// Stream adapter returned by [`normalize`].
    pub struct Normalize<S> {
        #[pin]
        inner: S,
        failed: bool,
    }
}

/// Normalize a delta stream. The first error ends the stream.
pub fn normalize<S>(inner: S) -> Normalize<S>
where
    S: Stream<Item = Result<RawDelta>>,
{
    Normalize {
        inner,
        failed: false,
    }
}

impl<S> Stream for Normalize<S>
where
    S: Stream<Item = Result<RawDelta>>,
{
    type Item = Result<GenEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.failed {
            return Poll::Ready(None);
        }
        loop {
            let item = match ready!(this.inner.as_mut().poll_next(cx)) {
                None => return Poll::Ready(None),
                Some(Ok(delta)) => normalize_delta(delta),
                Some(Err(e)) => Err(e),
            };
            match item {
                Ok(Some(event)) => return Poll::Ready(Some(Ok(event))),
                Ok(None) => continue,
                Err(e) => {
                    *this.failed = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}
