//! Session event types for the presentation layer.
//!
//! Every mutation of the message log or session state is published as a
//! `SessionEvent`. Events are serializable so a front-end can forward them
//! verbatim (e.g. as JSON lines).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::message::Message;
use super::session::SessionSnapshot;
use super::stream::StreamOutcome;

/// Events emitted while a session is driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A message was appended to the log.
    MessageAppended { index: usize, message: Message },

    /// Streamed text was appended to the message at `index`.
    MessageUpdated { index: usize, delta: String },

    /// The active stream finished. `index` is the streamed message, if any
    /// delta arrived before the stream ended.
    StreamClosed {
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        outcome: StreamOutcome,
    },

    /// Session state (step, interrupt, flags) changed.
    StateChanged { snapshot: SessionSnapshot },
}

/// Channel-based event sender (async, unbounded).
pub type SessionEventTx = mpsc::UnboundedSender<Arc<SessionEvent>>;

/// Channel-based event receiver (async, unbounded).
pub type SessionEventRx = mpsc::UnboundedReceiver<Arc<SessionEvent>>;

/// Creates the observer channel.
///
/// Unbounded so log mutations never block and no notification is lost.
pub fn create_event_channel() -> (SessionEventTx, SessionEventRx) {
    mpsc::unbounded_channel()
}

/// Event sender wrapper shared by the message log and session state.
///
/// A detached sender drops every event, which is what tests and scripted
/// runs without an observer want.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<SessionEventTx>,
}

impl EventSender {
    pub fn new(tx: SessionEventTx) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn detached() -> Self {
        Self { tx: None }
    }

    /// Publishes an event. A closed receiver is ignored.
    pub fn emit(&self, ev: SessionEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Arc::new(ev));
        }
    }
}
