//! Session orchestration.

pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod manager;
pub mod message;
pub mod session;
pub mod stream;
#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{
    InterruptCategory, InterruptClassifier, InterruptOptions, InterruptRequest,
    KeywordClassifier, LabeledOption, OptionDisplay, RunOrigin, option_display,
};
pub use dispatcher::{ContinuationDispatcher, Effect, Route, Submission};
pub use error::{FailureKind, InvalidStateError};
pub use events::{EventSender, SessionEvent, SessionEventRx, SessionEventTx, create_event_channel};
pub use manager::{CancelHandle, ManagerOptions, SessionManager};
pub use message::{Message, MessageLog, Role};
pub use session::{ProgressMap, Session, SessionSnapshot, Stage, WorkflowStep};
pub use stream::{MergeResult, StreamHandle, StreamItem, StreamMerger, StreamOutcome};
