//! Logging init: a non-blocking file under the data dir, or stderr when the
//! log dir is unwritable.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SHELLCACHE_LOG";
const DEFAULT_FILTER: &str = "info,shellcache=debug";

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Default log directory: `$XDG_DATA_HOME/shellcache/logs`.
pub fn default_log_dir() -> Option<PathBuf> {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|dir| dir.join("shellcache").join("logs"))
}

/// Initialize structured logging to `<dir>/shellcache.log`.
///
/// The returned guard flushes buffered lines on drop; keep it alive for the
/// whole run.
pub fn init_file(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(dir, "shellcache.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  tracing::info!("logging to {}", dir.join("shellcache.log").display());
  Ok(guard)
}

/// Initialize logging to stderr only.
pub fn init_stderr() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(std::io::stderr)
    .try_init();
}

/// Log to file when possible, falling back to stderr.
pub fn init() -> Option<WorkerGuard> {
  let Some(dir) = default_log_dir() else {
    init_stderr();
    return None;
  };

  match init_file(&dir) {
    Ok(guard) => Some(guard),
    Err(err) => {
      init_stderr();
      tracing::warn!(error = %err, "file logging unavailable, using stderr");
      None
    }
  }
}
