//! Conversation messages and the append-only message log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::InterruptCategory;
use super::error::InvalidStateError;
use super::events::{EventSender, SessionEvent};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    /// A selection among offered options, kept apart from free-text input.
    Choice,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Choice => "choice",
        }
    }
}

/// One turn in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Which interrupt a `choice` message answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice_category: Option<InterruptCategory>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            choice_category: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn choice(content: impl Into<String>, category: InterruptCategory) -> Self {
        Self {
            choice_category: Some(category),
            ..Self::new(Role::Choice, content)
        }
    }
}

/// Append-only, ordered record of conversation turns.
///
/// Messages are never reordered or removed. The only mutation allowed is
/// extending the content of the assistant message opened by
/// [`begin_stream`](Self::begin_stream), and only until the stream ends.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    streaming: Option<usize>,
    events: EventSender,
}

impl MessageLog {
    pub fn new(events: EventSender) -> Self {
        Self {
            messages: Vec::new(),
            streaming: None,
            events,
        }
    }

    /// Appends a message and returns its index.
    ///
    /// An active stream is ended first so later deltas cannot land on a
    /// message that is no longer last.
    pub fn append(&mut self, message: Message) -> usize {
        self.end_stream();
        self.push(message)
    }

    /// Appends an empty assistant message and makes it the stream target.
    pub fn begin_stream(&mut self) -> usize {
        self.end_stream();
        let index = self.push(Message::assistant(String::new()));
        self.streaming = Some(index);
        index
    }

    /// Extends the content of the streaming assistant message.
    ///
    /// # Errors
    /// Returns `InvalidStateError` if the last message is not an assistant
    /// message or no stream is active.
    pub fn update_last_assistant(&mut self, delta: &str) -> Result<usize, InvalidStateError> {
        let last = self.messages.len().checked_sub(1);
        let Some(index) = last.filter(|&i| self.messages[i].role == Role::Assistant) else {
            return Err(InvalidStateError::LastMessageNotAssistant);
        };
        if self.streaming != Some(index) {
            return Err(InvalidStateError::NoActiveStream);
        }

        self.messages[index].content.push_str(delta);
        self.events.emit(SessionEvent::MessageUpdated {
            index,
            delta: delta.to_string(),
        });
        Ok(index)
    }

    /// Ends the active stream, returning the index it targeted.
    pub fn end_stream(&mut self) -> Option<usize> {
        self.streaming.take()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// Read-only view over the messages in append order.
    ///
    /// Each call starts a fresh iteration.
    pub fn all(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn push(&mut self, message: Message) -> usize {
        let index = self.messages.len();
        self.messages.push(message.clone());
        self.events
            .emit(SessionEvent::MessageAppended { index, message });
        index
    }
}
