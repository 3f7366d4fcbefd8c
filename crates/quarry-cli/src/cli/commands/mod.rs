//! CLI command handlers.

use std::io::Write;

use anyhow::Result;
use quarry_core::backend::ResearchBackend;
use quarry_core::core::{
    Effect, InvalidStateError, SessionEventRx, SessionManager, Submission,
};

use super::render::Renderer;

pub mod ask;
pub mod chat;
pub mod config;
pub mod remote;

/// Runs one submission, rendering events as they arrive.
///
/// Events still queued when the submission finishes are drained before
/// returning so output never trails the prompt.
async fn drive<B>(
    manager: &mut SessionManager<B>,
    submission: Submission,
    events: &mut SessionEventRx,
    renderer: &mut Renderer,
    out: &mut impl Write,
) -> Result<Result<Effect, InvalidStateError>>
where
    B: ResearchBackend + ?Sized,
{
    let submit = manager.submit(submission);
    tokio::pin!(submit);

    let outcome = loop {
        tokio::select! {
            outcome = &mut submit => break outcome,
            Some(event) = events.recv() => renderer.render(&event, out)?,
        }
    };
    while let Ok(event) = events.try_recv() {
        renderer.render(&event, out)?;
    }
    Ok(outcome)
}
