//! Session manager: the single entry point for user actions.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::classifier::{InterruptClassifier, InterruptOptions, option_display};
use super::dispatcher::{ContinuationDispatcher, Effect, Route, Submission, route};
use super::error::InvalidStateError;
use super::events::EventSender;
use super::message::{Message, MessageLog};
use super::session::{ProgressMap, Session, SessionSnapshot};
use super::stream::StreamOutcome;
use crate::backend::{HistoryResponse, ResearchBackend};
use crate::config::Config;

/// Tunables for a [`SessionManager`].
#[derive(Debug, Clone, Default)]
pub struct ManagerOptions {
    /// Longest gap between stream chunks. `None` disables the check.
    pub stream_idle_timeout: Option<Duration>,
    pub progress: ProgressMap,
}

impl ManagerOptions {
    /// Reads the options from the loaded config.
    ///
    /// # Errors
    /// Returns an error if the `[progress]` table is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            stream_idle_timeout: config.stream_idle_timeout(),
            progress: config.progress_map()?,
        })
    }
}

/// Cancels whatever request or stream the manager is running.
///
/// Cloneable and usable from any thread (e.g. a Ctrl+C handler). Cancelling
/// when nothing is in flight has no effect on the next submission.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    current: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        lock(&self.current).cancel();
    }
}

fn lock(token: &Mutex<CancellationToken>) -> MutexGuard<'_, CancellationToken> {
    token.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the busy flag when a call finishes or its future is dropped.
struct BusyGuard<'a> {
    session: &'a mut Session,
}

impl<'a> BusyGuard<'a> {
    fn enter(session: &'a mut Session) -> Self {
        session.set_busy(true);
        Self { session }
    }
}

impl Deref for BusyGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for BusyGuard<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.session.set_busy(false);
    }
}

/// Coordinates one research session.
///
/// Owns the [`Session`] and [`MessageLog`], routes each submission to the
/// right continuation call, and publishes every change through the
/// [`EventSender`] it was built with. One call or stream is in flight at a
/// time.
pub struct SessionManager<B: ?Sized> {
    session: Session,
    log: MessageLog,
    dispatcher: ContinuationDispatcher<B>,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl<B> SessionManager<B>
where
    B: ResearchBackend + ?Sized,
{
    pub fn new(backend: Arc<B>, options: ManagerOptions, events: EventSender) -> Self {
        let dispatcher = ContinuationDispatcher::new(backend, events.clone())
            .with_stream_idle_timeout(options.stream_idle_timeout);
        Self {
            session: Session::new(options.progress, events.clone()),
            log: MessageLog::new(events),
            dispatcher,
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Replaces the keyword classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn InterruptClassifier>) -> Self {
        self.dispatcher.set_classifier(classifier);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn messages(&self) -> std::slice::Iter<'_, Message> {
        self.log.all()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            current: Arc::clone(&self.cancel),
        }
    }

    /// Handles one user action.
    ///
    /// The action is recorded in the log (a `user` message for text, a
    /// `choice` message for a picked option) and then dispatched. After a
    /// stream completes cleanly, step and interrupt are refreshed from the
    /// backend.
    ///
    /// # Errors
    /// Returns `InvalidStateError` if a call is already in flight, the
    /// submission is empty, or an option is picked that the pending
    /// interrupt does not offer. Remote failures are not errors; they are
    /// reported in the log and in the returned [`Effect`].
    pub async fn submit(&mut self, submission: Submission) -> Result<Effect, InvalidStateError> {
        if self.session.is_busy() {
            return Err(InvalidStateError::Busy);
        }
        self.check_submission(&submission)?;

        let route = route(&self.session, &submission);
        tracing::debug!(?route, "Dispatching submission");
        self.record_submission(&submission);

        let cancel = self.fresh_token();
        let dispatcher = &self.dispatcher;
        let log = &mut self.log;
        let mut session = BusyGuard::enter(&mut self.session);

        match route {
            Route::Start => Ok(dispatcher
                .start(&mut session, log, submission.user_input(), &cancel)
                .await),
            Route::Respond => {
                dispatcher
                    .respond(
                        &mut session,
                        log,
                        submission.choice(),
                        Some(submission.user_input()),
                        &cancel,
                    )
                    .await
            }
            Route::FollowUp => {
                dispatcher
                    .follow_up(&mut session, log, submission.user_input(), &cancel)
                    .await
            }
            Route::Stream => {
                let effect = dispatcher
                    .stream(&mut session, log, submission.choice(), &cancel)
                    .await?;
                if let Effect::Streamed(merged) = &effect
                    && merged.outcome == StreamOutcome::Completed
                {
                    dispatcher.refresh(&mut session, log, &cancel, true).await?;
                }
                Ok(effect)
            }
        }
    }

    /// Re-reads step and interrupt from the backend.
    ///
    /// # Errors
    /// Returns `InvalidStateError` if busy or no thread was started.
    pub async fn refresh_state(&mut self) -> Result<Effect, InvalidStateError> {
        if self.session.is_busy() {
            return Err(InvalidStateError::Busy);
        }
        if self.session.thread_id().is_none() {
            return Err(InvalidStateError::NoThread);
        }

        let cancel = self.fresh_token();
        let mut session = BusyGuard::enter(&mut self.session);
        self.dispatcher
            .refresh(&mut session, &mut self.log, &cancel, false)
            .await
    }

    /// Fetches the backend's record of the conversation.
    ///
    /// # Errors
    /// Returns an error if no thread was started or the call fails.
    pub async fn conversation_history(&self) -> Result<HistoryResponse> {
        let thread_id = self
            .session
            .thread_id()
            .ok_or(InvalidStateError::NoThread)?;
        self.dispatcher
            .backend()
            .conversation_history(thread_id)
            .await
            .with_context(|| format!("Failed to fetch conversation history for {thread_id}"))
    }

    fn check_submission(&self, submission: &Submission) -> Result<(), InvalidStateError> {
        if submission.choice().is_empty() {
            return Err(InvalidStateError::EmptySubmission);
        }
        if let Submission::Option { token, .. } = submission {
            let interrupt = self
                .session
                .pending_interrupt()
                .ok_or(InvalidStateError::NoPendingInterrupt)?;
            if !interrupt.options.contains(token.trim()) {
                return Err(InvalidStateError::UnknownOption {
                    token: token.clone(),
                });
            }
        }
        Ok(())
    }

    fn record_submission(&mut self, submission: &Submission) {
        let message = match (submission, self.session.pending_interrupt()) {
            (Submission::Option { token, .. }, Some(interrupt)) => {
                let token = token.trim();
                Message::choice(
                    choice_text(&interrupt.options, token),
                    interrupt.category,
                )
            }
            (Submission::Option { token, .. }, None) => Message::user(token.trim()),
            (Submission::Text(text), _) => Message::user(text.trim()),
        };
        self.log.append(message);
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *lock(&self.cancel) = token.clone();
        token
    }
}

fn choice_text(options: &InterruptOptions, token: &str) -> String {
    match options {
        InterruptOptions::Labeled(_) => options.label_for(token).to_string(),
        InterruptOptions::Tokens(_) => option_display(token).choice_text().to_string(),
    }
}

impl<B: ?Sized> Drop for SessionManager<B> {
    fn drop(&mut self) {
        lock(&self.cancel).cancel();
    }
}
