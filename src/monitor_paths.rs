//! Centralized home-based storage paths for all shift-monitor persistence.
//!
//! Everything lives under `~/.shift-monitor/`:
//! - `credentials.json` - Access/refresh credential pair
//! - `credentials.lock` - Cross-process write lock for the pair
//! - `config.yaml` - Optional configuration file
//! - `logs/monitor.log` - tracing output
//! - `logs/events.jsonl` - Structured live feed journal
//!
//! `SHIFT_MONITOR_HOME` moves the whole tree (used by tests and by
//! operators running several dashboards side by side).

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the shift-monitor directory inside the user's home.
const SHIFT_MONITOR_DIR: &str = ".shift-monitor";

/// Environment variable that overrides the storage root.
pub const HOME_ENV: &str = "SHIFT_MONITOR_HOME";

/// Returns the storage root: `$SHIFT_MONITOR_HOME` or `~/.shift-monitor/`.
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn monitor_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(root) if !root.is_empty() => PathBuf::from(root),
        _ => dirs::home_dir()
            .context("Could not determine home directory for shift-monitor storage")?
            .join(SHIFT_MONITOR_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the credential file path: `~/.shift-monitor/credentials.json`
pub fn credentials_path() -> Result<PathBuf> {
    Ok(monitor_home_dir()?.join("credentials.json"))
}

/// Returns the default config file path: `~/.shift-monitor/config.yaml`
pub fn config_path() -> Result<PathBuf> {
    Ok(monitor_home_dir()?.join("config.yaml"))
}

/// Returns the logs directory: `~/.shift-monitor/logs/`
///
/// Creates the directory if it doesn't exist.
pub fn logs_dir() -> Result<PathBuf> {
    let dir = monitor_home_dir()?.join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the tracing log path: `~/.shift-monitor/logs/monitor.log`
pub fn monitor_log_path() -> Result<PathBuf> {
    Ok(logs_dir()?.join("monitor.log"))
}
