//! `watch` command: follow the live feed and print the view as it changes.

use crate::config::MonitorConfig;
use crate::live::{FeedState, LiveFeed, LiveStore, SharedStore};
use crate::monitor_paths;
use crate::structured_logger::StructuredLogger;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Why one connection's follow loop ended.
enum Exit {
    Shutdown,
    /// The shift completed; reconnect at once for a fresh `shift_init`.
    Remount,
    Disconnected,
}

pub async fn run_watch(config: &MonitorConfig) -> Result<()> {
    let logs_dir = monitor_paths::logs_dir()?;
    let journal_id = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let logger = Arc::new(
        StructuredLogger::new(&journal_id, &logs_dir).context("Failed to open feed journal")?,
    );
    info!(
        journal = logger.journal_id(),
        path = %logger.path().display(),
        feed = %config.feed_url,
        "Watching live feed"
    );
    let (store, _) = LiveStore::new(config.reload_delay(), Arc::clone(&logger));

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let mut print = |line: &str| println!("{}", line);
    watch_feed(config, store.into_shared(), logger, shutdown, &mut print).await
}

/// Keeps a feed connected until `shutdown` resolves, reporting through `out`.
///
/// Returns an error only when the feed is lost and reconnecting is disabled.
async fn watch_feed<F>(
    config: &MonitorConfig,
    store: SharedStore,
    logger: Arc<StructuredLogger>,
    shutdown: F,
    out: &mut dyn FnMut(&str),
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let (mut view_rx, mut reload_rx) = {
        let store = store.lock().await;
        (store.subscribe(), store.reload_signal())
    };
    tokio::pin!(shutdown);

    out(&view_rx.borrow_and_update().summary());
    let mut failures: u32 = 0;

    loop {
        let mut feed = LiveFeed::new(&config.feed_url, Arc::clone(&store), Arc::clone(&logger));
        let opened = tokio::select! {
            result = feed.open() => result,
            _ = &mut shutdown => return Ok(()),
        };

        let exit = match opened {
            Ok(()) => {
                failures = 0;
                loop {
                    tokio::select! {
                        changed = view_rx.changed() => {
                            if changed.is_err() {
                                break Exit::Disconnected;
                            }
                            let summary = view_rx.borrow_and_update().summary();
                            out(&summary);
                        }
                        changed = reload_rx.changed() => {
                            if changed.is_ok() && *reload_rx.borrow_and_update() {
                                break Exit::Remount;
                            }
                        }
                        _ = feed.closed() => break Exit::Disconnected,
                        _ = &mut shutdown => break Exit::Shutdown,
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Live feed connection failed");
                out(&format!("feed unavailable: {:#}", e));
                Exit::Disconnected
            }
        };

        match exit {
            Exit::Shutdown => {
                feed.close();
                return Ok(());
            }
            Exit::Remount => {
                info!("Shift completed; remounting live feed");
                out("shift completed, reloading");
                feed.close();
                logger.increment_run_id();
                continue;
            }
            Exit::Disconnected => {}
        }

        if feed.state() != FeedState::Closed {
            feed.close();
        }
        if !config.reconnect.enabled {
            bail!("Live feed to {} closed and reconnect is disabled", config.feed_url);
        }

        failures = failures.saturating_add(1);
        let delay = config.reconnect.delay_for(failures);
        info!(attempt = failures, delay_ms = delay.as_millis() as u64, "Reconnecting live feed");
        out(&format!("feed closed, reconnecting in {} ms", delay.as_millis()));

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => return Ok(()),
        }
        logger.increment_run_id();
    }
}

#[cfg(test)]
#[path = "tests/watch_tests.rs"]
mod tests;
