use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_ENV: &str = "REELFEED_LOG_FILE";
const DEFAULT_DIRECTIVE: &str = "reelfeed=info";

/// Installs the global subscriber.
///
/// The terminal belongs to the UI, so events are written to the file named by
/// `REELFEED_LOG_FILE` and dropped when it is unset. `RUST_LOG` overrides the
/// default filter.
pub fn init() -> Result<bool> {
    let Ok(path) = std::env::var(LOG_FILE_ENV) else {
        return Ok(false);
    };
    let path = path.trim();
    if path.is_empty() {
        return Ok(false);
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {path}"))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!("install tracing subscriber: {err}"))?;

    Ok(true)
}
