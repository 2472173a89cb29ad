//! Owner of the live view.
//!
//! This is the only place the view changes. Every envelope goes through
//! `apply`, which runs the reducer, journals the outcome, schedules the
//! reload on completion and broadcasts the new view.

use super::model::LiveView;
use super::protocol::Envelope;
use super::reducer::{reduce, FeedEvent};
use super::reload::ReloadDebouncer;
use crate::structured_logger::StructuredLogger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Handle shared by the feed connection and the owning view.
pub type SharedStore = Arc<Mutex<LiveStore>>;

pub struct LiveStore {
    view: LiveView,
    snapshot_tx: watch::Sender<LiveView>,
    reload: ReloadDebouncer,
    logger: Arc<StructuredLogger>,
    seq: u64,
}

impl LiveStore {
    /// Creates an empty store.
    ///
    /// Returns the store and a watch receiver for view snapshots.
    pub fn new(
        reload_delay: Duration,
        logger: Arc<StructuredLogger>,
    ) -> (Self, watch::Receiver<LiveView>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(LiveView::default());
        let store = Self {
            view: LiveView::default(),
            snapshot_tx,
            reload: ReloadDebouncer::new(reload_delay),
            logger,
            seq: 0,
        };
        (store, snapshot_rx)
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Folds one envelope into the view.
    /// Returns the reducer events; the snapshot is broadcast only on change.
    pub fn apply(&mut self, envelope: Envelope) -> Vec<FeedEvent> {
        self.seq += 1;
        self.logger.log_envelope(self.seq, envelope.kind());

        let (view, events) = reduce(std::mem::take(&mut self.view), envelope);
        self.view = view;

        for event in &events {
            self.logger.log_feed_event(self.seq, event);
            if matches!(event, FeedEvent::SessionCompleted { .. }) {
                self.reload.arm();
            }
        }

        let view = &self.view;
        self.snapshot_tx.send_if_modified(|current| {
            if current == view {
                false
            } else {
                current.clone_from(view);
                true
            }
        });

        events
    }

    /// Journals a frame that never reached the reducer.
    pub fn record_dropped(&self, reason: &str) {
        self.logger.log_frame_dropped(reason);
    }

    pub fn view(&self) -> &LiveView {
        &self.view
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveView> {
        self.snapshot_tx.subscribe()
    }

    /// Receiver for the pending-reload flag.
    pub fn reload_signal(&self) -> watch::Receiver<bool> {
        self.reload.subscribe()
    }

    pub fn reload_pending(&self) -> bool {
        self.reload.is_pending()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
