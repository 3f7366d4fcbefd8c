//! Continuation dispatch: picks and performs the backend call for a user action.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::classifier::{
    InterruptClassifier, InterruptRequest, KeywordClassifier, RunOrigin, is_format_choice,
};
use super::error::{FailureKind, InvalidStateError};
use super::events::EventSender;
use super::message::{Message, MessageLog};
use super::session::{Session, WorkflowStep};
use super::stream::{MergeResult, StreamMerger};
use crate::backend::{BackendError, BackendResult, ResearchBackend, WorkflowResponse};

pub const START_FAILURE_NOTICE: &str =
    "Sorry, there was an error starting the conversation. Please try again.";
pub const RESPOND_FAILURE_NOTICE: &str =
    "Sorry, there was an error processing your response. Please try again.";
pub const FOLLOW_UP_FAILURE_NOTICE: &str =
    "Sorry, there was an error processing your follow-up question. Please try again.";
pub const STREAM_OPEN_FAILURE_NOTICE: &str = "Sorry, there was an error starting the stream.";
pub const REFRESH_FAILURE_NOTICE: &str =
    "Sorry, there was an error refreshing the research state. Please try again.";

/// A user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Free text typed by the user.
    Text(String),
    /// An offered option was picked. `user_input` defaults to the token.
    Option {
        token: String,
        user_input: Option<String>,
    },
}

impl Submission {
    pub fn text(text: impl Into<String>) -> Self {
        Submission::Text(text.into())
    }

    pub fn option(token: impl Into<String>) -> Self {
        Submission::Option {
            token: token.into(),
            user_input: None,
        }
    }

    /// Value sent as `choice`.
    pub fn choice(&self) -> &str {
        match self {
            Submission::Text(text) => text.trim(),
            Submission::Option { token, .. } => token.trim(),
        }
    }

    /// Value sent as `user_input` (or as the message for start/follow-up).
    pub fn user_input(&self) -> &str {
        match self {
            Submission::Text(text) => text.trim(),
            Submission::Option { token, user_input } => user_input
                .as_deref()
                .map(str::trim)
                .filter(|input| !input.is_empty())
                .unwrap_or(token.trim()),
        }
    }
}

/// Continuation protocol chosen for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Start,
    Respond,
    FollowUp,
    Stream,
}

/// Routing rule, in priority order:
/// 1. no thread → `Start`
/// 2. thread and pending interrupt → `Respond`, or `Stream` for a format choice
/// 3. thread only → `FollowUp`
pub fn route(session: &Session, submission: &Submission) -> Route {
    if session.thread_id().is_none() {
        return Route::Start;
    }
    if session.pending_interrupt().is_some() {
        if is_format_choice(submission.choice()) {
            Route::Stream
        } else {
            Route::Respond
        }
    } else {
        Route::FollowUp
    }
}

/// What a dispatched call did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The response was applied. `appended` is the completed-output message.
    Applied { appended: Option<usize> },
    /// The call failed; session state is unchanged.
    Failed {
        kind: FailureKind,
        error: BackendError,
        /// System message reporting the failure (absent for quiet refreshes).
        notice: Option<usize>,
    },
    /// A streamed completion ran.
    Streamed(MergeResult),
    /// The call was cancelled before it finished; nothing was applied.
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Start,
    Respond,
    FollowUp,
    OpenStream,
    Refresh,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Respond => "resume",
            Operation::FollowUp => "continue",
            Operation::OpenStream => "stream",
            Operation::Refresh => "get_state",
        }
    }

    fn failure_notice(self) -> &'static str {
        match self {
            Operation::Start => START_FAILURE_NOTICE,
            Operation::Respond => RESPOND_FAILURE_NOTICE,
            Operation::FollowUp => FOLLOW_UP_FAILURE_NOTICE,
            Operation::OpenStream => STREAM_OPEN_FAILURE_NOTICE,
            Operation::Refresh => REFRESH_FAILURE_NOTICE,
        }
    }
}

/// Validated response, ready to apply.
struct Update {
    thread_id: Option<String>,
    step: WorkflowStep,
    interrupt: Option<InterruptRequest>,
    final_response: Option<String>,
}

/// Performs start / respond / follow-up / stream calls and applies results.
///
/// Responses are validated in full before anything is mutated, so a
/// malformed response never leaves the session half-updated. Remote
/// failures become one system message and an unchanged session.
pub struct ContinuationDispatcher<B: ?Sized> {
    backend: Arc<B>,
    classifier: Arc<dyn InterruptClassifier>,
    merger: StreamMerger,
    stream_idle_timeout: Option<Duration>,
}

impl<B> ContinuationDispatcher<B>
where
    B: ResearchBackend + ?Sized,
{
    pub fn new(backend: Arc<B>, events: EventSender) -> Self {
        Self {
            backend,
            classifier: Arc::new(KeywordClassifier),
            merger: StreamMerger::new(events),
            stream_idle_timeout: None,
        }
    }

    pub fn set_classifier(&mut self, classifier: Arc<dyn InterruptClassifier>) {
        self.classifier = classifier;
    }

    #[must_use]
    pub fn with_stream_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.stream_idle_timeout = idle_timeout;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Starts a new research thread.
    pub async fn start(
        &self,
        session: &mut Session,
        log: &mut MessageLog,
        message: &str,
        cancel: &CancellationToken,
    ) -> Effect {
        tracing::debug!("Starting research thread");
        let Some(result) = cancellable(cancel, self.backend.start(message)).await else {
            return Effect::Cancelled;
        };

        match result.and_then(|response| self.validate(&response, RunOrigin::Initial, true)) {
            Ok(update) => {
                session.set_run_origin(RunOrigin::Initial);
                apply(session, log, update, true)
            }
            Err(err) => report_failure(log, Operation::Start, err),
        }
    }

    /// Answers the pending interrupt.
    ///
    /// # Errors
    /// Returns `InvalidStateError` if there is no thread or no pending interrupt.
    pub async fn respond(
        &self,
        session: &mut Session,
        log: &mut MessageLog,
        choice: &str,
        free_text: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Effect, InvalidStateError> {
        let thread_id = session
            .thread_id()
            .ok_or(InvalidStateError::NoThread)?
            .to_string();
        if session.pending_interrupt().is_none() {
            return Err(InvalidStateError::NoPendingInterrupt);
        }
        let user_input = free_text.unwrap_or(choice);

        tracing::debug!(%thread_id, choice, "Resuming research thread");
        let call = self.backend.resume(&thread_id, choice, user_input);
        let Some(result) = cancellable(cancel, call).await else {
            return Ok(Effect::Cancelled);
        };

        let origin = session.run_origin();
        Ok(
            match result.and_then(|response| self.validate(&response, origin, false)) {
                Ok(update) => apply(session, log, update, true),
                Err(err) => report_failure(log, Operation::Respond, err),
            },
        )
    }

    /// Sends a follow-up question on the current thread.
    ///
    /// # Errors
    /// Returns `InvalidStateError::NoThread` if no thread was started.
    pub async fn follow_up(
        &self,
        session: &mut Session,
        log: &mut MessageLog,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Effect, InvalidStateError> {
        let thread_id = session
            .thread_id()
            .ok_or(InvalidStateError::NoThread)?
            .to_string();

        tracing::debug!(%thread_id, "Sending follow-up question");
        let call = self.backend.follow_up(&thread_id, message);
        let Some(result) = cancellable(cancel, call).await else {
            return Ok(Effect::Cancelled);
        };

        Ok(
            match result.and_then(|response| self.validate(&response, RunOrigin::FollowUp, false))
            {
                Ok(update) => {
                    session.set_run_origin(RunOrigin::FollowUp);
                    apply(session, log, update, true)
                }
                Err(err) => report_failure(log, Operation::FollowUp, err),
            },
        )
    }

    /// Streams the final answer for `choice` into the log.
    ///
    /// # Errors
    /// Returns `InvalidStateError::NoThread` if no thread was started.
    pub async fn stream(
        &self,
        session: &mut Session,
        log: &mut MessageLog,
        choice: &str,
        cancel: &CancellationToken,
    ) -> Result<Effect, InvalidStateError> {
        let thread_id = session
            .thread_id()
            .ok_or(InvalidStateError::NoThread)?
            .to_string();

        tracing::debug!(%thread_id, choice, "Opening response stream");
        let attach = StreamMerger::attach(
            self.backend.as_ref(),
            &thread_id,
            choice,
            cancel.clone(),
            self.stream_idle_timeout,
        );
        let Some(opened) = cancellable(cancel, attach).await else {
            return Ok(Effect::Cancelled);
        };

        let mut handle = match opened {
            Ok(handle) => handle,
            Err(err) => return Ok(report_failure(log, Operation::OpenStream, err)),
        };
        let merged = self.merger.merge(&mut handle, session, log).await;
        Ok(Effect::Streamed(merged))
    }

    /// Re-reads step and interrupt from `get_state`.
    ///
    /// Completed output is never appended here; it was already delivered by
    /// the call that produced it. A `quiet` refresh logs failures without
    /// touching the message log.
    ///
    /// # Errors
    /// Returns `InvalidStateError::NoThread` if no thread was started.
    pub async fn refresh(
        &self,
        session: &mut Session,
        log: &mut MessageLog,
        cancel: &CancellationToken,
        quiet: bool,
    ) -> Result<Effect, InvalidStateError> {
        let thread_id = session
            .thread_id()
            .ok_or(InvalidStateError::NoThread)?
            .to_string();

        let Some(result) = cancellable(cancel, self.backend.get_state(&thread_id)).await else {
            return Ok(Effect::Cancelled);
        };

        let origin = session.run_origin();
        Ok(
            match result.and_then(|response| self.validate(&response, origin, false)) {
                Ok(update) => apply(session, log, update, false),
                Err(err) if quiet => {
                    let kind = FailureKind::from(err.kind);
                    tracing::warn!(%thread_id, %kind, error = %err, "State refresh failed");
                    Effect::Failed {
                        kind,
                        error: err,
                        notice: None,
                    }
                }
                Err(err) => report_failure(log, Operation::Refresh, err),
            },
        )
    }

    fn validate(
        &self,
        response: &WorkflowResponse,
        origin: RunOrigin,
        needs_thread: bool,
    ) -> BackendResult<Update> {
        let thread_id = response
            .thread_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        if needs_thread && thread_id.is_none() {
            return Err(BackendError::malformed("Response is missing thread_id"));
        }

        let Some(requires_input) = response.requires_input else {
            return Err(BackendError::malformed("Response is missing requires_input"));
        };
        let Some(step) = response.current_step() else {
            return Err(BackendError::malformed("Response is missing current_step"));
        };

        let interrupt = if requires_input {
            let Some(prompt) = response.interrupt_message() else {
                return Err(BackendError::malformed(
                    "Response requires input but has no interrupt_message",
                ));
            };
            Some(self.classifier.classify(prompt, origin))
        } else {
            None
        };

        Ok(Update {
            thread_id,
            step: WorkflowStep::parse(step),
            interrupt,
            final_response: response.final_response().map(str::to_string),
        })
    }
}

fn apply(session: &mut Session, log: &mut MessageLog, update: Update, append_final: bool) -> Effect {
    let has_interrupt = update.interrupt.is_some();
    session.apply_response(update.thread_id, update.step, update.interrupt);

    let appended = match update.final_response {
        Some(text) if append_final && !has_interrupt => Some(log.append(Message::assistant(text))),
        _ => None,
    };
    Effect::Applied { appended }
}

fn report_failure(log: &mut MessageLog, operation: Operation, err: BackendError) -> Effect {
    let kind = FailureKind::from(err.kind);
    tracing::warn!(
        operation = operation.name(),
        %kind,
        error = %err,
        details = err.details.as_deref().unwrap_or_default(),
        "Backend call failed"
    );
    let notice = log.append(Message::system(operation.failure_notice()));
    Effect::Failed {
        kind,
        error: err,
        notice: Some(notice),
    }
}

async fn cancellable<T>(cancel: &CancellationToken, call: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = call => Some(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendErrorKind, StreamChunk};
    use crate::core::classifier::{CONTINUE_CONTEXT_OPTION, InterruptCategory};
    use crate::core::message::Role;
    use crate::core::stream::StreamOutcome;
    use crate::core::testing::{
        DIRECTION_PROMPT, FORMAT_PROMPT, PLAN_PROMPT, ScriptedBackend, completed, interrupted,
    };

    fn dispatcher(backend: ScriptedBackend) -> ContinuationDispatcher<ScriptedBackend> {
        ContinuationDispatcher::new(Arc::new(backend), EventSender::detached())
    }

    async fn started(
        dispatcher: &ContinuationDispatcher<ScriptedBackend>,
    ) -> (Session, MessageLog) {
        let mut session = Session::default();
        let mut log = MessageLog::default();
        dispatcher
            .start(&mut session, &mut log, "q", &CancellationToken::new())
            .await;
        (session, log)
    }

    #[test]
    fn test_routing_priority() {
        let mut session = Session::default();
        assert_eq!(route(&session, &Submission::text("hi")), Route::Start);

        session.apply_response(Some("t-1".to_string()), WorkflowStep::Completed, None);
        assert_eq!(route(&session, &Submission::text("more?")), Route::FollowUp);

        let interrupt = KeywordClassifier.classify(PLAN_PROMPT, RunOrigin::Initial);
        session.apply_response(None, WorkflowStep::Planning, Some(interrupt));
        assert_eq!(route(&session, &Submission::option("proceed")), Route::Respond);
        assert_eq!(route(&session, &Submission::text("proceed")), Route::Respond);
        assert_eq!(
            route(&session, &Submission::option("executive")),
            Route::Stream
        );
        assert_eq!(route(&session, &Submission::text("executive")), Route::Stream);
    }

    #[test]
    fn test_submission_user_input_defaults_to_token() {
        assert_eq!(Submission::option("focused").user_input(), "focused");
        let with_text = Submission::Option {
            token: "focused".to_string(),
            user_input: Some("only hardware".to_string()),
        };
        assert_eq!(with_text.choice(), "focused");
        assert_eq!(with_text.user_input(), "only hardware");
    }

    #[tokio::test]
    async fn test_start_with_interrupt_sets_pending_and_no_assistant_message() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(interrupted(Some("t-1"), "planning", PLAN_PROMPT)));
        let dispatcher = dispatcher(backend);

        let (session, log) = started(&dispatcher).await;

        assert_eq!(session.thread_id(), Some("t-1"));
        assert_eq!(session.current_step(), &WorkflowStep::Planning);
        let interrupt = session.pending_interrupt().unwrap();
        assert_eq!(interrupt.category, InterruptCategory::PlanApproval);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_final_response_appends_exactly_one_assistant_message() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(interrupted(Some("t-1"), "planning", PLAN_PROMPT)));
        backend.push_response(Ok(completed("completed", "Here is the overview.")));
        let dispatcher = dispatcher(backend);
        let (mut session, mut log) = started(&dispatcher).await;

        let effect = dispatcher
            .respond(
                &mut session,
                &mut log,
                "simplified",
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(effect, Effect::Applied { appended: Some(0) });
        assert_eq!(log.len(), 1);
        assert_eq!(log.get(0).unwrap().role, Role::Assistant);
        assert_eq!(log.get(0).unwrap().content, "Here is the overview.");
        assert!(session.pending_interrupt().is_none());
        assert_eq!(session.current_step(), &WorkflowStep::Completed);
        assert_eq!(
            dispatcher.backend().calls(),
            vec!["start:q", "resume:t-1:simplified:simplified"]
        );
    }

    #[tokio::test]
    async fn test_respond_transport_error_leaves_state_unchanged() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(interrupted(Some("t-1"), "planning", PLAN_PROMPT)));
        backend.push_response(Err(BackendError::http_status(500, "")));
        let dispatcher = dispatcher(backend);
        let (mut session, mut log) = started(&dispatcher).await;
        let before = session.snapshot();

        let effect = dispatcher
            .respond(&mut session, &mut log, "proceed", None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            effect,
            Effect::Failed {
                kind: FailureKind::Transport,
                notice: Some(0),
                ..
            }
        ));
        assert_eq!(log.len(), 1);
        assert_eq!(log.get(0).unwrap().role, Role::System);
        assert_eq!(log.get(0).unwrap().content, RESPOND_FAILURE_NOTICE);
        assert_eq!(session.snapshot(), before);
    }

    #[tokio::test]
    async fn test_malformed_response_is_rejected_before_mutation() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(interrupted(Some("t-1"), "planning", PLAN_PROMPT)));
        let mut missing_prompt = interrupted(None, "research_direction_check", "x");
        missing_prompt.interrupt_message = None;
        backend.push_response(Ok(missing_prompt));
        let dispatcher = dispatcher(backend);
        let (mut session, mut log) = started(&dispatcher).await;

        let effect = dispatcher
            .respond(&mut session, &mut log, "proceed", None, &CancellationToken::new())
            .await
            .unwrap();

        let Effect::Failed { kind, error, .. } = effect else {
            panic!("expected failure");
        };
        assert_eq!(kind, FailureKind::MalformedResponse);
        assert_eq!(error.kind, BackendErrorKind::Parse);
        assert_eq!(session.current_step(), &WorkflowStep::Planning);
        assert_eq!(
            session.pending_interrupt().unwrap().category,
            InterruptCategory::PlanApproval
        );
    }

    #[tokio::test]
    async fn test_start_without_thread_id_is_malformed() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(interrupted(None, "planning", PLAN_PROMPT)));
        let dispatcher = dispatcher(backend);

        let (session, log) = started(&dispatcher).await;

        assert_eq!(session.thread_id(), None);
        assert_eq!(log.get(0).unwrap().content, START_FAILURE_NOTICE);
    }

    #[tokio::test]
    async fn test_respond_without_interrupt_is_invalid_state() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(completed("completed", "done")));
        let dispatcher = dispatcher(backend);
        let mut session = Session::default();
        let mut log = MessageLog::default();

        let err = dispatcher
            .respond(&mut session, &mut log, "proceed", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, InvalidStateError::NoThread);

        session.apply_response(Some("t-1".to_string()), WorkflowStep::Completed, None);
        let err = dispatcher
            .respond(&mut session, &mut log, "proceed", None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, InvalidStateError::NoPendingInterrupt);
        assert!(dispatcher.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_direction_prompt_offers_context_option() {
        let backend = ScriptedBackend::default();
        let mut first = completed("completed", "first answer");
        first.thread_id = Some("t-1".to_string());
        backend.push_response(Ok(first));
        backend.push_response(Ok(interrupted(None, "planning", PLAN_PROMPT)));
        backend.push_response(Ok(interrupted(
            None,
            "research_direction_check",
            DIRECTION_PROMPT,
        )));
        let dispatcher = dispatcher(backend);
        let (mut session, mut log) = started(&dispatcher).await;
        let cancel = CancellationToken::new();

        dispatcher
            .follow_up(&mut session, &mut log, "and error correction?", &cancel)
            .await
            .unwrap();
        assert_eq!(session.run_origin(), RunOrigin::FollowUp);

        dispatcher
            .respond(&mut session, &mut log, "proceed", None, &cancel)
            .await
            .unwrap();
        let interrupt = session.pending_interrupt().unwrap();
        assert_eq!(interrupt.category, InterruptCategory::DirectionRefinement);
        assert!(interrupt.options.contains(CONTINUE_CONTEXT_OPTION));
    }

    #[tokio::test]
    async fn test_stream_open_failure_keeps_interrupt_pending() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(interrupted(Some("t-1"), "format_selection", FORMAT_PROMPT)));
        backend.push_stream(Err(BackendError::http_status(503, "")));
        let dispatcher = dispatcher(backend);
        let (mut session, mut log) = started(&dispatcher).await;

        let effect = dispatcher
            .stream(&mut session, &mut log, "executive", &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(effect, Effect::Failed { notice: Some(0), .. }));
        assert_eq!(log.get(0).unwrap().content, STREAM_OPEN_FAILURE_NOTICE);
        assert!(session.pending_interrupt().is_some());
    }

    #[tokio::test]
    async fn test_stream_merges_into_log() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(interrupted(Some("t-1"), "format_selection", FORMAT_PROMPT)));
        backend.push_stream(Ok(vec![
            Ok(StreamChunk::Delta {
                text: "Quantum ".to_string(),
                seq: None,
            }),
            Ok(StreamChunk::Delta {
                text: "computing is...".to_string(),
                seq: None,
            }),
            Ok(StreamChunk::Done),
        ]));
        let dispatcher = dispatcher(backend);
        let (mut session, mut log) = started(&dispatcher).await;

        let effect = dispatcher
            .stream(&mut session, &mut log, "comprehensive", &CancellationToken::new())
            .await
            .unwrap();

        let Effect::Streamed(merged) = effect else {
            panic!("expected stream");
        };
        assert_eq!(merged.outcome, StreamOutcome::Completed);
        assert_eq!(log.get(0).unwrap().content, "Quantum computing is...");
        assert_eq!(
            dispatcher.backend().calls(),
            vec!["start:q", "stream:t-1:comprehensive"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_call_applies_nothing() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(interrupted(Some("t-1"), "planning", PLAN_PROMPT)));
        let dispatcher = dispatcher(backend);
        let mut session = Session::default();
        let mut log = MessageLog::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let effect = dispatcher.start(&mut session, &mut log, "q", &cancel).await;

        assert_eq!(effect, Effect::Cancelled);
        assert_eq!(session.thread_id(), None);
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_updates_step_without_appending_output() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(interrupted(Some("t-1"), "format_selection", FORMAT_PROMPT)));
        backend.push_state(Ok(completed("completed", "already streamed")));
        let dispatcher = dispatcher(backend);
        let (mut session, mut log) = started(&dispatcher).await;

        let effect = dispatcher
            .refresh(&mut session, &mut log, &CancellationToken::new(), true)
            .await
            .unwrap();

        assert_eq!(effect, Effect::Applied { appended: None });
        assert!(log.is_empty());
        assert_eq!(session.current_step(), &WorkflowStep::Completed);
        assert!(session.pending_interrupt().is_none());
    }

    #[tokio::test]
    async fn test_quiet_refresh_failure_does_not_touch_log() {
        let backend = ScriptedBackend::default();
        backend.push_response(Ok(interrupted(Some("t-1"), "planning", PLAN_PROMPT)));
        backend.push_state(Err(BackendError::timeout("slow")));
        let dispatcher = dispatcher(backend);
        let (mut session, mut log) = started(&dispatcher).await;

        let effect = dispatcher
            .refresh(&mut session, &mut log, &CancellationToken::new(), true)
            .await
            .unwrap();

        assert!(matches!(effect, Effect::Failed { notice: None, .. }));
        assert!(log.is_empty());
        assert_eq!(session.current_step(), &WorkflowStep::Planning);
    }
}
