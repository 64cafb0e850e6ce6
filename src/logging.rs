//! Tracing setup: a daily rolling log file plus terse stderr output.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FILE_NAME: &str = "installer.log";

/// Install the global subscriber. Keep the returned guard alive for the life
/// of the process or buffered file output is lost.
pub fn init(logs_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("create logs directory {}", logs_dir.display()))?;

    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(file_filter);

    let stderr_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_level);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("install tracing subscriber")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        logs = %logs_dir.display(),
        "vencord-installer starting"
    );
    Ok(guard)
}
