//! Pending-reload flag raised when a shift completes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Raises a `pending` flag on `arm()` and lowers it `delay` later.
///
/// Re-arming while pending restarts the delay; at most one timer exists.
/// Subscribers see exactly one `false -> true` transition per armed period,
/// which is when the owner should remount its view.
pub struct ReloadDebouncer {
    delay: Duration,
    pending: Arc<watch::Sender<bool>>,
    timer: Option<JoinHandle<()>>,
}

impl ReloadDebouncer {
    pub fn new(delay: Duration) -> Self {
        let (pending, _) = watch::channel(false);
        Self {
            delay,
            pending: Arc::new(pending),
            timer: None,
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn arm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        // Only the rising edge notifies; a re-arm is silent.
        self.pending.send_if_modified(|pending| !std::mem::replace(pending, true));

        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.send_if_modified(|pending| std::mem::replace(pending, false));
        }));
    }

    /// Lowers the flag immediately and cancels the timer.
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.pending
            .send_if_modified(|pending| std::mem::replace(pending, false));
    }

    pub fn is_pending(&self) -> bool {
        *self.pending.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.pending.subscribe()
    }
}

impl Drop for ReloadDebouncer {
    fn drop(&mut self) {
        self.disarm();
    }
}
