//! Scripted research run.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Result, bail};
use quarry_core::backend::ResearchBackend;
use quarry_core::config::Config;
use quarry_core::core::{
    Effect, EventSender, ManagerOptions, SessionManager, StreamOutcome, Submission,
    create_event_channel,
};

use super::drive;
use crate::cli::render::{Renderer, retry_hint};
use crate::interrupt::{self, InterruptedError};

/// Submits `message`, then answers each interrupt with the next of `choices`.
///
/// Stops when the run completes, the choices run out, or a call fails.
pub async fn run<B>(
    backend: Arc<B>,
    config: &Config,
    message: &str,
    choices: &[String],
) -> Result<()>
where
    B: ResearchBackend + ?Sized,
{
    let options = ManagerOptions::from_config(config)?;
    let (tx, mut events) = create_event_channel();
    let mut manager = SessionManager::new(backend, options, EventSender::new(tx));

    let cancel = manager.cancel_handle();
    interrupt::set_cancel_hook(move || cancel.cancel());

    let mut renderer = Renderer::new(true);
    let mut out = io::stdout();
    let mut choices = choices.iter();
    let mut submission = Submission::text(message);

    loop {
        let effect =
            drive(&mut manager, submission, &mut events, &mut renderer, &mut out).await??;
        check_effect(&effect)?;

        if manager.session().pending_interrupt().is_none() {
            break;
        }
        let Some(choice) = choices.next() else {
            writeln!(out, "Waiting for a choice; pass another --choice to continue.")?;
            break;
        };
        submission = Submission::option(choice.as_str());
    }

    if let Some(thread_id) = manager.session().thread_id() {
        writeln!(out, "thread: {thread_id}")?;
    }
    Ok(())
}

fn check_effect(effect: &Effect) -> Result<()> {
    match effect {
        Effect::Applied { .. } => Ok(()),
        Effect::Failed { kind, error, .. } => {
            bail!(
                "Research request failed ({kind}): {error}{}",
                retry_hint(error)
            )
        }
        Effect::Streamed(merged) => match &merged.outcome {
            StreamOutcome::Completed => Ok(()),
            StreamOutcome::Failed { message } => bail!("Response stream failed: {message}"),
            StreamOutcome::Cancelled => Err(InterruptedError.into()),
        },
        Effect::Cancelled => Err(InterruptedError.into()),
    }
}
