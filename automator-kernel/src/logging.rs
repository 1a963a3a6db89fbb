//! Tracing bootstrap: `RUST_LOG` wins over the configured level, and an
//! optional log file gets its own non-blocking writer.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if level.trim().is_empty() {
            EnvFilter::new("info")
        } else {
            EnvFilter::new(level)
        }
    })
}

/// Installs the global subscriber. Keep the returned guard alive for as long
/// as file output should be flushed.
pub fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(env_filter(level));
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    let Some(path) = log_file else {
        registry.with(stdout_layer).try_init()?;
        return Ok(None);
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log dir: {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file: {}", path.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file_writer);

    registry.with(stdout_layer).with(file_layer).try_init()?;
    Ok(Some(guard))
}
