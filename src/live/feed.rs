//! Push-channel connection feeding the live store.
//!
//! `CLOSED -> CONNECTING -> OPEN -> CLOSED`. The reader task decodes frames
//! in arrival order and hands each envelope to the store before reading the
//! next one. After `close()` (or a transport-level close) the reader is
//! inert: a frame it already holds is never applied.

use super::protocol::{decode_frame, Envelope};
use super::store::SharedStore;
use crate::structured_logger::StructuredLogger;
use anyhow::{bail, Context, Result};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Closed,
    Connecting,
    Open,
}

impl FeedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedState::Closed => "closed",
            FeedState::Connecting => "connecting",
            FeedState::Open => "open",
        }
    }
}

/// Transport-neutral inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

/// Frames as produced by a transport; `Err` ends the connection.
pub type FrameStream = BoxStream<'static, Result<Frame, String>>;

pub struct LiveFeed {
    url: String,
    store: SharedStore,
    logger: Arc<StructuredLogger>,
    state_tx: Arc<watch::Sender<FeedState>>,
    /// Liveness of the current reader; replaced on every attach.
    alive: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl LiveFeed {
    pub fn new(url: impl Into<String>, store: SharedStore, logger: Arc<StructuredLogger>) -> Self {
        let (state_tx, _) = watch::channel(FeedState::Closed);
        Self {
            url: url.into(),
            store,
            logger,
            state_tx: Arc::new(state_tx),
            alive: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Performs the websocket handshake and starts reading.
    pub async fn open(&mut self) -> Result<()> {
        if self.state() != FeedState::Closed {
            bail!("Feed to {} is already {}", self.url, self.state().as_str());
        }
        set_state(&self.state_tx, &self.logger, &self.url, FeedState::Connecting);

        let (socket, _) = match connect_async(self.url.as_str()).await {
            Ok(connected) => connected,
            Err(e) => {
                set_state(&self.state_tx, &self.logger, &self.url, FeedState::Closed);
                return Err(e).with_context(|| format!("Failed to connect to {}", self.url));
            }
        };
        info!(url = %self.url, "Live feed connected");

        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
                Ok(_) => None,
                Err(e) => Some(Err(e.to_string())),
            }
        });
        self.attach(frames);
        Ok(())
    }

    /// Starts the reader over an already established frame source.
    /// Must be called from within a tokio runtime.
    pub fn attach<S>(&mut self, frames: S)
    where
        S: Stream<Item = Result<Frame, String>> + Send + 'static,
    {
        self.stop_reader();

        let alive = Arc::new(AtomicBool::new(true));
        self.alive = Arc::clone(&alive);
        set_state(&self.state_tx, &self.logger, &self.url, FeedState::Open);

        let reader = Reader {
            url: self.url.clone(),
            store: Arc::clone(&self.store),
            logger: Arc::clone(&self.logger),
            state_tx: Arc::clone(&self.state_tx),
            alive,
        };
        self.reader = Some(tokio::spawn(reader.run(frames.boxed())));
    }

    /// Tears the connection down. Frames the reader has not applied yet are discarded.
    pub fn close(&mut self) {
        self.stop_reader();
        set_state(&self.state_tx, &self.logger, &self.url, FeedState::Closed);
    }

    /// Resolves once the feed is closed, by `close()` or by the transport.
    pub async fn closed(&self) {
        let mut rx = self.subscribe_state();
        let _ = rx.wait_for(|state| *state == FeedState::Closed).await;
    }

    pub fn state(&self) -> FeedState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<FeedState> {
        self.state_tx.subscribe()
    }

    fn stop_reader(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.close();
    }
}

fn set_state(
    state_tx: &watch::Sender<FeedState>,
    logger: &StructuredLogger,
    url: &str,
    next: FeedState,
) {
    let changed = state_tx.send_if_modified(|state| {
        if *state == next {
            false
        } else {
            *state = next;
            true
        }
    });
    if changed {
        logger.log_connection(url, next.as_str());
    }
}

struct Reader {
    url: String,
    store: SharedStore,
    logger: Arc<StructuredLogger>,
    state_tx: Arc<watch::Sender<FeedState>>,
    alive: Arc<AtomicBool>,
}

impl Reader {
    async fn run(self, mut frames: FrameStream) {
        while let Some(next) = frames.next().await {
            if !self.alive.load(Ordering::SeqCst) {
                return;
            }
            match next {
                Ok(Frame::Text(text)) => self.dispatch(&text).await,
                Ok(Frame::Close) => {
                    info!(url = %self.url, "Live feed closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Live feed transport error");
                    break;
                }
            }
        }

        // A reader stopped by close() must not touch the state it no longer owns.
        if self.alive.swap(false, Ordering::SeqCst) {
            set_state(&self.state_tx, &self.logger, &self.url, FeedState::Closed);
        }
    }

    async fn dispatch(&self, text: &str) {
        match decode_frame(text) {
            Ok(Envelope::Unknown { kind }) => {
                warn!(kind = %kind, "Dropping envelope with unknown type");
                self.store
                    .lock()
                    .await
                    .record_dropped(&format!("unknown type: {}", kind));
            }
            Ok(envelope) => {
                let mut store = self.store.lock().await;
                // Re-checked under the lock: close() may have run while we waited.
                if !self.alive.load(Ordering::SeqCst) {
                    return;
                }
                let events = store.apply(envelope);
                debug!(
                    ?events,
                    view = %store.view().summary(),
                    reload_pending = store.reload_pending(),
                    "Applied envelope"
                );
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                self.store.lock().await.record_dropped(&e.to_string());
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/feed_tests.rs"]
mod tests;
