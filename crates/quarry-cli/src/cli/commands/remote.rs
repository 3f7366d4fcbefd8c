//! One-shot backend queries.

use anyhow::{Context, Result};
use quarry_core::backend::ResearchBackend;

/// Prints `get_state` for a thread as JSON.
pub async fn state(backend: &impl ResearchBackend, thread_id: &str) -> Result<()> {
    let state = backend
        .get_state(thread_id)
        .await
        .with_context(|| format!("get state for thread {thread_id}"))?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Prints the backend's conversation history for a thread as JSON.
pub async fn history(backend: &impl ResearchBackend, thread_id: &str) -> Result<()> {
    let history = backend
        .conversation_history(thread_id)
        .await
        .with_context(|| format!("get conversation history for thread {thread_id}"))?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}
