//! Tracing subscriber setup.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber, appending to `log_file_path`.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. Fails if a global
/// subscriber is already set.
pub fn init_global(log_file_path: &Path) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .with_context(|| format!("Failed to open log file: {}", log_file_path.display()))?;

    build_subscriber(log_file, EnvFilter::try_from_default_env().ok())
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

/// Builds the file-logging subscriber. `filter` falls back to `info`.
pub fn build_subscriber(
    log_file: File,
    filter: Option<EnvFilter>,
) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = filter.unwrap_or_else(|| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}
