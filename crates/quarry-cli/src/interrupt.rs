//! Ctrl+C handling.
//!
//! The first Ctrl+C runs the registered cancel hook (which stops the active
//! request or stream) and wakes anyone waiting on [`wait_for_interrupt`].
//! A second Ctrl+C before [`reset`] exits the process with code 130.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

use anyhow::{Context, Result};
use tokio::sync::Notify;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INTERRUPT_NOTIFY: OnceLock<Notify> = OnceLock::new();
type CancelHook = Box<dyn Fn() + Send + Sync>;
static CANCEL_HOOK: Mutex<Option<CancelHook>> = Mutex::new(None);

#[derive(Debug)]
pub struct InterruptedError;

impl std::fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interrupted")
    }
}

impl std::error::Error for InterruptedError {}

/// Installs the Ctrl+C handler.
///
/// The handler never prints; stdout belongs to the renderer.
pub fn init() -> Result<()> {
    ctrlc::set_handler(trigger_ctrl_c).context("set Ctrl+C handler")
}

fn trigger_ctrl_c() {
    if INTERRUPTED.swap(true, Ordering::SeqCst) {
        std::process::exit(130);
    }
    if let Some(hook) = CANCEL_HOOK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        hook();
    }
    INTERRUPT_NOTIFY.get_or_init(Notify::new).notify_waiters();
}

/// Registers the action the first Ctrl+C performs.
pub fn set_cancel_hook<F>(hook: F)
where
    F: Fn() + Send + Sync + 'static,
{
    *CANCEL_HOOK.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Waits until an interrupt is triggered.
pub async fn wait_for_interrupt() {
    loop {
        let notified = INTERRUPT_NOTIFY.get_or_init(Notify::new).notified();
        if is_interrupted() {
            return;
        }
        notified.await;
    }
}

/// Re-arms the handler after an interrupted request was dealt with.
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}
