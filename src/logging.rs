//! File logging for the CLI. Stdout carries the redirect prompts, so every
//! event goes to a daily log under the data root instead.

use std::fs;
use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::Subscriber;
use tracing_subscriber::EnvFilter;

use crate::errors::{GateError, Result};

pub const LOG_FILE_PREFIX: &str = "download-gate.log";
/// Filter directives for this client; falls back to `RUST_LOG`.
pub const LOG_FILTER_ENV: &str = "DOWNLOAD_GATE_LOG";
const DEFAULT_DIRECTIVES: &str = "warn,download_gate=info";

static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

pub fn init(log_dir: &Path) -> Result<()> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }
    fs::create_dir_all(log_dir)?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let subscriber = Subscriber::builder()
        .with_env_filter(build_filter(std::env::var(LOG_FILTER_ENV).ok().as_deref()))
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| GateError::Logging(err.to_string()))?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!(dir = %log_dir.display(), "logging to {}", LOG_FILE_PREFIX);
    Ok(())
}

fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}
