//! File logging for the CLI.
//!
//! Logs go to `${SCHOOLDOCS_HOME}/logs/schooldocs.log.<date>` so stdout stays
//! reserved for command output. The filter comes from `SCHOOLDOCS_LOG`, then
//! the configured `log_level`, then `info`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "SCHOOLDOCS_LOG";

const LOG_FILE_PREFIX: &str = "schooldocs.log";

/// Builds the filter: env var, then config, then `info`.
pub fn build_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a daily-rotated, non-blocking file subscriber under `dir`.
///
/// The returned guard flushes pending lines when dropped; keep it alive for
/// the duration of the program.
///
/// # Errors
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_file_logging(config: &Config, dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(config))
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("Failed to install log subscriber: {err}"))?;

    Ok(guard)
}
