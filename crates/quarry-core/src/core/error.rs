//! Session-level error types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::BackendErrorKind;

/// A caller broke the session contract.
///
/// These are programming or sequencing errors and are returned to the caller
/// instead of being written to the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidStateError {
    /// A request or stream is already outstanding.
    Busy,
    /// A delta arrived while no stream was active.
    NoActiveStream,
    /// The most recent message is not an assistant message.
    LastMessageNotAssistant,
    /// `respond` was called with no pending interrupt.
    NoPendingInterrupt,
    /// The call needs a thread but the session has none yet.
    NoThread,
    /// The submission carried no text.
    EmptySubmission,
    /// The option token is not offered by the pending interrupt.
    UnknownOption { token: String },
}

impl fmt::Display for InvalidStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidStateError::Busy => write!(f, "a request is already in progress"),
            InvalidStateError::NoActiveStream => write!(f, "no stream is active"),
            InvalidStateError::LastMessageNotAssistant => {
                write!(f, "the last message is not an assistant message")
            }
            InvalidStateError::NoPendingInterrupt => write!(f, "no interrupt is pending"),
            InvalidStateError::NoThread => write!(f, "no research thread has been started"),
            InvalidStateError::EmptySubmission => write!(f, "nothing to submit"),
            InvalidStateError::UnknownOption { token } => {
                write!(f, "'{token}' is not one of the offered options")
            }
        }
    }
}

impl std::error::Error for InvalidStateError {}

/// Remote failure categories surfaced in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network error, timeout, or non-success status
    Transport,
    /// Error event or abnormal end of the event stream
    Stream,
    /// Response was missing required fields; handled like `Transport`
    MalformedResponse,
}

impl From<BackendErrorKind> for FailureKind {
    fn from(kind: BackendErrorKind) -> Self {
        match kind {
            BackendErrorKind::HttpStatus | BackendErrorKind::Timeout | BackendErrorKind::Network => {
                FailureKind::Transport
            }
            BackendErrorKind::Parse => FailureKind::MalformedResponse,
            BackendErrorKind::Stream => FailureKind::Stream,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transport => write!(f, "transport"),
            FailureKind::Stream => write!(f, "stream"),
            FailureKind::MalformedResponse => write!(f, "malformed_response"),
        }
    }
}
