//! Research stream parser.
//!
//! Turns the `text/event-stream` body of `GET /stream` into normalized
//! [`StreamChunk`]s.

use std::collections::VecDeque;
use std::pin::Pin;

use eventsource_stream::{EventStream, Eventsource};
use futures_util::Stream;

use super::shared::{BackendError, BackendResult};
use super::types::{StreamChunk, StreamPayload};

/// SSE stream parser for research stream events.
pub struct StreamChunkParser<S> {
    inner: EventStream<S>,
    pending: VecDeque<StreamChunk>,
}

impl<S> StreamChunkParser<S> {
    pub fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
            pending: VecDeque::new(),
        }
    }

    fn handle_event_data(&mut self, data: &str) -> BackendResult<()> {
        let trimmed = data.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        let payload = serde_json::from_str::<StreamPayload>(trimmed)
            .map_err(|err| BackendError::malformed(format!("Failed to parse stream event: {err}")))?;
        self.handle_payload(payload);
        Ok(())
    }

    fn handle_payload(&mut self, payload: StreamPayload) {
        // Errors are terminal even when the server also sets `done`.
        if payload.kind == "error" {
            let message = if payload.content.trim().is_empty() {
                "Stream reported an error".to_string()
            } else {
                payload.content
            };
            self.pending.push_back(StreamChunk::Error { message });
            return;
        }

        if !payload.content.is_empty() {
            self.pending.push_back(StreamChunk::Delta {
                text: payload.content,
                seq: payload.seq,
            });
        }

        if payload.done || payload.kind == "done" {
            self.pending.push_back(StreamChunk::Done);
        }
    }
}

impl<S, E> Stream for StreamChunkParser<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = BackendResult<StreamChunk>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(chunk)));
            }

            let inner = Pin::new(&mut self.inner);
            match inner.poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if let Err(err) = self.handle_event_data(&event.data) {
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(BackendError::stream(format!(
                        "SSE stream error: {e}"
                    )))));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
