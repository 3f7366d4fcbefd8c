//! File logging.
//!
//! Logs go to `$QUARRY_HOME/logs/quarry.log` so stdout stays owned by the
//! renderer. `QUARRY_LOG` takes an `EnvFilter` directive (default `info`).

use quarry_core::config::paths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "QUARRY_LOG";

/// Installs the global subscriber.
///
/// Returns `None` (logging disabled) if the log directory cannot be created.
/// Keep the guard alive until exit so buffered lines are flushed.
pub fn init() -> Option<WorkerGuard> {
    let dir = paths::logs_dir();
    if std::fs::create_dir_all(&dir).is_err() {
        return None;
    }

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix("quarry")
        .filename_suffix("log")
        .build(&dir)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_err| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(guard)
}
