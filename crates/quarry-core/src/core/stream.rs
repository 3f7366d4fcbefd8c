//! Stream merging: folds streamed chunks into the message log.

use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::events::{EventSender, SessionEvent};
use super::message::{Message, MessageLog};
use super::session::Session;
use crate::backend::{BackendError, BackendResult, ChunkStream, ResearchBackend, StreamChunk};

/// System message appended when an open stream fails.
pub const STREAM_FAILURE_NOTICE: &str = "Sorry, there was an error with the streaming response.";

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamOutcome {
    /// The server signalled completion.
    Completed,
    /// Error event, abnormal end, idle timeout, or ordering violation.
    Failed { message: String },
    /// The handle was closed by the caller.
    Cancelled,
}

/// Item produced by [`StreamHandle::next_item`].
#[derive(Debug)]
pub enum StreamItem {
    Delta(String),
    Completed,
    Failed(BackendError),
    /// The handle is closed; nothing more will be delivered.
    Closed,
}

/// Open stream for one thread/choice pair.
///
/// Closing is idempotent and safe before the first delta. Once closed the
/// underlying connection is dropped and only [`StreamItem::Closed`] is
/// returned.
pub struct StreamHandle {
    inner: Option<ChunkStream>,
    cancel: CancellationToken,
    idle_timeout: Option<Duration>,
    last_seq: Option<u64>,
}

impl StreamHandle {
    pub fn new(
        stream: ChunkStream,
        cancel: CancellationToken,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Some(stream),
            cancel,
            idle_timeout,
            last_seq: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    pub fn close(&mut self) {
        self.inner = None;
    }

    /// Waits for the next item.
    ///
    /// Terminal items (`Completed`, `Failed`) close the handle. Cancelling
    /// the token closes it as well.
    pub async fn next_item(&mut self) -> StreamItem {
        let cancel = self.cancel.clone();
        let idle_timeout = self.idle_timeout;
        let Some(stream) = self.inner.as_mut() else {
            return StreamItem::Closed;
        };

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            next = next_chunk(stream, idle_timeout) => Some(next),
        };

        let item = match next {
            None => {
                self.close();
                return StreamItem::Closed;
            }
            Some(Err(timeout)) => StreamItem::Failed(BackendError::timeout(format!(
                "No stream data received for {}ms",
                timeout.as_millis()
            ))),
            Some(Ok(None)) => StreamItem::Failed(BackendError::stream(
                "Stream ended before completion",
            )),
            Some(Ok(Some(Err(err)))) => StreamItem::Failed(err),
            Some(Ok(Some(Ok(chunk)))) => match chunk {
                StreamChunk::Delta { text, seq } => match self.check_order(seq) {
                    Ok(()) => return StreamItem::Delta(text),
                    Err(err) => StreamItem::Failed(err),
                },
                StreamChunk::Done => StreamItem::Completed,
                StreamChunk::Error { message } => StreamItem::Failed(BackendError::stream(message)),
            },
        };

        self.close();
        item
    }

    fn check_order(&mut self, seq: Option<u64>) -> BackendResult<()> {
        let Some(seq) = seq else {
            return Ok(());
        };
        if let Some(last) = self.last_seq
            && seq <= last
        {
            return Err(BackendError::stream(format!(
                "Out-of-order stream chunk {seq} after {last}"
            )));
        }
        self.last_seq = Some(seq);
        Ok(())
    }
}

async fn next_chunk(
    stream: &mut ChunkStream,
    idle_timeout: Option<Duration>,
) -> Result<Option<BackendResult<StreamChunk>>, Duration> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, stream.next())
            .await
            .map_err(|_elapsed| limit),
        None => Ok(stream.next().await),
    }
}

/// Result of merging one stream into the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// Index of the streamed assistant message, if any delta arrived.
    pub message: Option<usize>,
    pub outcome: StreamOutcome,
    /// Index of the system message reporting a failure.
    pub notice: Option<usize>,
}

/// Folds stream deltas into the most recent assistant message.
#[derive(Debug, Clone, Default)]
pub struct StreamMerger {
    events: EventSender,
}

impl StreamMerger {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    /// Opens the stream for `choice` on `thread_id`.
    ///
    /// # Errors
    /// Returns the backend error if the stream cannot be opened.
    pub async fn attach<B>(
        backend: &B,
        thread_id: &str,
        choice: &str,
        cancel: CancellationToken,
        idle_timeout: Option<Duration>,
    ) -> BackendResult<StreamHandle>
    where
        B: ResearchBackend + ?Sized,
    {
        let stream = backend.stream(thread_id, choice).await?;
        Ok(StreamHandle::new(stream, cancel, idle_timeout))
    }

    /// Consumes `handle` until it completes, fails, or is closed.
    ///
    /// The first delta opens an empty assistant message, clears the loading
    /// flag and the pending interrupt, then applies the delta. Failures keep
    /// partial content and append a separate system message. Cancellation
    /// leaves the log untouched.
    pub async fn merge(
        &self,
        handle: &mut StreamHandle,
        session: &mut Session,
        log: &mut MessageLog,
    ) -> MergeResult {
        let mut message = None;

        let (outcome, notice) = loop {
            match handle.next_item().await {
                StreamItem::Delta(text) => {
                    if message.is_none() {
                        message = Some(log.begin_stream());
                        session.output_started();
                    }
                    if let Err(err) = log.update_last_assistant(&text) {
                        handle.close();
                        tracing::warn!(error = %err, "Dropping stream delta");
                        break (StreamOutcome::Failed { message: err.to_string() }, None);
                    }
                }
                StreamItem::Completed => break (StreamOutcome::Completed, None),
                StreamItem::Failed(err) => {
                    tracing::warn!(kind = %err.kind, error = %err, "Stream failed");
                    log.end_stream();
                    let notice = log.append(Message::system(STREAM_FAILURE_NOTICE));
                    break (
                        StreamOutcome::Failed {
                            message: err.message,
                        },
                        Some(notice),
                    );
                }
                StreamItem::Closed => break (StreamOutcome::Cancelled, None),
            }
        };

        log.end_stream();
        self.events.emit(SessionEvent::StreamClosed {
            index: message,
            outcome: outcome.clone(),
        });

        MergeResult {
            message,
            outcome,
            notice,
        }
    }
}
