//! CLI entry and dispatch.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use quarry_core::backend::{BASE_URL_ENV, BackendConfig, HttpBackend};
use quarry_core::config;

use crate::interrupt;

mod commands;
mod logging;
mod render;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(version = "0.1")]
#[command(about = "Terminal client for an interactive research backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Research backend origin (overrides env and config)
    #[arg(long, global = true, value_name = "URL")]
    backend_url: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Interactive research session (default)
    Chat,
    /// Asks one question and answers interrupts from the command line
    Ask {
        /// The research question
        #[arg(value_name = "MESSAGE")]
        message: String,

        /// Option to pick at each interrupt, in order
        #[arg(long = "choice", value_name = "TOKEN")]
        choices: Vec<String>,
    },
    /// Prints the backend's state for a thread
    State {
        #[arg(value_name = "THREAD_ID")]
        id: String,
    },
    /// Prints the backend's conversation history for a thread
    History {
        #[arg(value_name = "THREAD_ID")]
        id: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Config commands never touch the backend or the log directory.
    if let Some(Commands::Config { command }) = &cli.command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        };
    }

    let _log_guard = logging::init();
    interrupt::init()?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;
    let backend_config = BackendConfig::from_config(&config, cli.backend_url.as_deref())
        .with_context(|| format!("resolve backend URL (flag, {BASE_URL_ENV}, or config)"))?;
    tracing::info!(base_url = %backend_config.base_url, "Using research backend");
    let backend = Arc::new(HttpBackend::new(backend_config));

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => commands::chat::run(backend, &config).await,
        Commands::Ask { message, choices } => {
            commands::ask::run(backend, &config, &message, &choices).await
        }
        Commands::State { id } => commands::remote::state(backend.as_ref(), &id).await,
        Commands::History { id } => commands::remote::history(backend.as_ref(), &id).await,
        Commands::Config { .. } => Ok(()),
    }
}
