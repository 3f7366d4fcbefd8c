//! Orchestration core for the quarry research client.
//!
//! - `backend`: protocol types, HTTP client, and SSE parsing for the research service
//! - `config`: configuration loading (`$QUARRY_HOME/config.toml`)
//! - `core`: session state machine, message log, interrupt classification,
//!   continuation dispatch, and stream merging

pub mod backend;
pub mod config;
pub mod core;
