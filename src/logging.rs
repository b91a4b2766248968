// File: src/logging.rs
use crate::paths::AppPaths;
use anyhow::{Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output to a daily log file; the terminal belongs to the UI.
/// `RUST_LOG` wins over `default_level`. Keep the guard alive until exit.
pub fn init(default_level: &str) -> Result<WorkerGuard> {
    let log_dir = AppPaths::get_log_dir()?;
    let appender = tracing_appender::rolling::daily(log_dir, "taskdeck.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_target(true)
        .with_ansi(false)
        .try_init();

    if let Err(err) = init_result {
        tracing::debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(guard)
}
