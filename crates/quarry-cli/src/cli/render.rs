//! Plain-text rendering of session events.

use std::io::{self, Write};

use chrono::Local;
use quarry_core::backend::BackendError;
use quarry_core::core::{
    InterruptRequest, Message, Role, SessionEvent, SessionSnapshot, StreamOutcome,
    option_display,
};

/// Turns the session event stream into terminal output.
///
/// Streamed deltas are printed inline as they arrive. The status line is
/// only reprinted when the step or its progress changes, and an interrupt
/// card only when a new interrupt becomes pending.
#[derive(Debug, Default)]
pub struct Renderer {
    /// Echo `user` messages (off in chat, where the user just typed them).
    echo_user: bool,
    status: Option<(String, u32)>,
    interrupt: Option<InterruptRequest>,
    streaming: bool,
}

impl Renderer {
    pub fn new(echo_user: bool) -> Self {
        Self {
            echo_user,
            ..Self::default()
        }
    }

    pub fn render(&mut self, event: &SessionEvent, out: &mut impl Write) -> io::Result<()> {
        match event {
            SessionEvent::MessageAppended { message, .. } => self.render_message(message, out)?,
            SessionEvent::MessageUpdated { delta, .. } => write!(out, "{delta}")?,
            SessionEvent::StreamClosed { outcome, .. } => {
                if self.streaming {
                    writeln!(out)?;
                    self.streaming = false;
                }
                if *outcome == StreamOutcome::Cancelled {
                    writeln!(out, "(cancelled)")?;
                }
            }
            SessionEvent::StateChanged { snapshot } => self.render_state(snapshot, out)?,
        }
        out.flush()
    }

    fn render_message(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        if message.role == Role::User && !self.echo_user {
            return Ok(());
        }
        if self.streaming {
            writeln!(out)?;
            self.streaming = false;
        }

        let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");
        let prefix = match (message.role, message.choice_category) {
            (Role::Choice, Some(category)) => format!("choice ({})", category.display_name()),
            (role, _) => role.as_str().to_string(),
        };

        // An empty assistant message opens a stream; deltas follow inline.
        if message.role == Role::Assistant && message.content.is_empty() {
            write!(out, "{prefix} [{time}]: ")?;
            self.streaming = true;
        } else {
            writeln!(out, "{prefix} [{time}]: {}", message.content)?;
        }
        Ok(())
    }

    fn render_state(&mut self, snapshot: &SessionSnapshot, out: &mut impl Write) -> io::Result<()> {
        if self.streaming {
            return Ok(());
        }

        let percent = (snapshot.progress * 100.0).round() as u32;
        let status = (snapshot.step_description.clone(), percent);
        if self.status.as_ref() != Some(&status) {
            writeln!(out, "[{} · {}%]", status.0, status.1)?;
            self.status = Some(status);
        }

        if snapshot.pending_interrupt != self.interrupt {
            self.interrupt.clone_from(&snapshot.pending_interrupt);
            if let Some(interrupt) = &self.interrupt {
                write_interrupt_card(interrupt, out)?;
            }
        }
        Ok(())
    }
}

/// Suffix for a failed call telling the user whether sending again may help.
pub fn retry_hint(error: &BackendError) -> &'static str {
    if error.is_retryable() {
        " (temporary failure, send it again to retry)"
    } else {
        ""
    }
}

fn write_interrupt_card(interrupt: &InterruptRequest, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "--- {} ---", interrupt.category.display_name())?;
    writeln!(out, "{}", interrupt.raw_message.trim())?;
    for (position, token) in interrupt.options.tokens().enumerate() {
        let display = option_display(token);
        let label = interrupt.options.label_for(token);
        write!(out, "  {}. ", position + 1)?;
        if let Some(glyph) = display.glyph {
            write!(out, "{glyph} ")?;
        }
        match display.description {
            Some(description) => writeln!(out, "{label} - {description}")?,
            None => writeln!(out, "{label}")?,
        }
    }
    writeln!(out, "Pick a number or type a reply.")
}
