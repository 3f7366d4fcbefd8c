//! Configuration management for quarry.
//!
//! Loads configuration from ${QUARRY_HOME}/config.toml with sensible defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::session::ProgressMap;

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for quarry configuration and log directories.
    //!
    //! QUARRY_HOME resolution order:
    //! 1. QUARRY_HOME environment variable (if set)
    //! 2. ~/.config/quarry (default)
    //! 3. ./.quarry when no home directory is known

    use std::path::PathBuf;

    pub const HOME_ENV: &str = "QUARRY_HOME";

    /// Returns the quarry home directory.
    pub fn quarry_home() -> PathBuf {
        if let Ok(home) = std::env::var(HOME_ENV)
            && !home.trim().is_empty()
        {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".quarry"),
            |h| h.join(".config").join("quarry"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        quarry_home().join("config.toml")
    }

    /// Returns the directory log files are written to.
    pub fn logs_dir() -> PathBuf {
        quarry_home().join("logs")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend origin. Empty or missing falls back to the environment, then
    /// the built-in default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    /// Per-call deadline for atomic requests. 0 disables.
    pub request_timeout_secs: u64,
    /// Idle limit between stream chunks. 0 disables.
    pub stream_idle_timeout_secs: u64,
    /// Step name -> stage name (or "none").
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub progress: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            stream_idle_timeout_secs: Self::DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
            progress: BTreeMap::new(),
        }
    }
}

impl Config {
    const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
    const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        secs_or_disabled(self.request_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        secs_or_disabled(self.stream_idle_timeout_secs)
    }

    /// Builds the step -> stage table with this config's overrides.
    ///
    /// # Errors
    /// Returns an error if an override names an unknown stage.
    pub fn progress_map(&self) -> Result<ProgressMap> {
        ProgressMap::from_table(&self.progress).context("Invalid [progress] table in config")
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    ///
    /// # Errors
    /// Returns an error if the file exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

fn secs_or_disabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
