//! Interactive chat loop.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use quarry_core::backend::ResearchBackend;
use quarry_core::config::Config;
use quarry_core::core::{
    Effect, EventSender, InterruptRequest, ManagerOptions, SessionManager, Submission,
    create_event_channel,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::drive;
use crate::cli::render::{Renderer, retry_hint};
use crate::interrupt::{self, InterruptedError};

pub async fn run<B>(backend: Arc<B>, config: &Config) -> Result<()>
where
    B: ResearchBackend + ?Sized,
{
    let options = ManagerOptions::from_config(config)?;
    let (tx, mut events) = create_event_channel();
    let mut manager = SessionManager::new(backend, options, EventSender::new(tx));

    let cancel = manager.cancel_handle();
    interrupt::set_cancel_hook(move || cancel.cancel());

    let mut renderer = Renderer::new(false);
    let mut out = io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    writeln!(out, "Ask a research question. Ctrl+C cancels, /quit exits.")?;
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("read input")?,
            () = interrupt::wait_for_interrupt() => return Err(InterruptedError.into()),
        };
        let Some(line) = line else { break };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" {
            break;
        }

        let submission = parse_input(input, manager.session().pending_interrupt());
        let outcome =
            drive(&mut manager, submission, &mut events, &mut renderer, &mut out).await?;
        match outcome {
            Ok(Effect::Failed { error, .. }) => writeln!(out, "! {error}{}", retry_hint(&error))?,
            Ok(_) => {}
            Err(err) => writeln!(out, "! {err}")?,
        }
        interrupt::reset();
    }

    Ok(())
}

/// A bare number picks the matching offered option; anything else is text.
fn parse_input(input: &str, interrupt: Option<&InterruptRequest>) -> Submission {
    let picked = interrupt.and_then(|interrupt| {
        let position = input.parse::<usize>().ok()?.checked_sub(1)?;
        interrupt.options.get(position)
    });
    match picked {
        Some(token) => Submission::option(token),
        None => Submission::text(input),
    }
}
