//! Tracing subscriber setup.
//!
//! The terminal UI owns stdout, so in TUI mode events go to a daily log file
//! under the data directory. CLI subcommands log to stderr. The filter is
//! read from `STOCKROOM_LOG` (e.g. `STOCKROOM_LOG=stockroom=debug`).

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FILTER_ENV: &str = "STOCKROOM_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Where log lines are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
  Stderr,
  /// Daily-rolling files named `stockroom.log.<date>` in this directory
  File(PathBuf),
}

impl LogTarget {
  /// Log directory used by the terminal UI.
  pub fn default_file() -> Result<Self> {
    let dir = dirs::data_dir()
      .ok_or_else(|| eyre!("Could not determine data directory"))?
      .join("stockroom")
      .join("logs");
    Ok(Self::File(dir))
  }
}

/// Install the global subscriber.
///
/// The returned guard flushes buffered file output and must be kept alive
/// until exit.
pub fn init(target: LogTarget) -> Result<Option<WorkerGuard>> {
  let filter = build_env_filter();

  match target {
    LogTarget::Stderr => {
      tracing_subscriber::registry()
        .with(filter)
        .with(
          fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time(),
        )
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
      Ok(None)
    }
    LogTarget::File(dir) => {
      std::fs::create_dir_all(&dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(&dir, "stockroom.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
      Ok(Some(guard))
    }
  }
}

fn build_env_filter() -> EnvFilter {
  EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
