//! tracing subscriber setup.

use crate::monitor_paths;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding an `EnvFilter` directive string.
pub const LOG_FILTER_ENV: &str = "SHIFT_MONITOR_LOG";

const DEFAULT_DIRECTIVE: &str = "shift_monitor=info";

/// Builds the filter from `SHIFT_MONITOR_LOG`, falling back to `shift_monitor=info`.
fn build_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs the global subscriber. Output goes to `~/.shift-monitor/logs/monitor.log`
/// so it never interleaves with the `watch` output; stderr is used only when the
/// log file cannot be opened.
pub fn init_logging() {
    let file = monitor_paths::monitor_log_path().ok().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    let registry = tracing_subscriber::registry().with(build_filter());
    let result = match file {
        Some(file) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .try_init(),
        None => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("[shiftmon] Warning: logging already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_falls_back_to_default_directive() {
        std::env::remove_var(LOG_FILTER_ENV);
        assert_eq!(build_filter().to_string(), DEFAULT_DIRECTIVE);
    }

    #[test]
    #[serial]
    fn test_filter_reads_environment() {
        std::env::set_var(LOG_FILTER_ENV, "shift_monitor=debug");
        let filter = build_filter();
        std::env::remove_var(LOG_FILTER_ENV);
        assert_eq!(filter.to_string(), "shift_monitor=debug");
    }
}
