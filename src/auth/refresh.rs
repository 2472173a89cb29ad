//! Single-flight access-credential refresh.
//!
//! The coordinator holds at most one outstanding attempt. Every caller that
//! arrives while it runs awaits the same shared future, so N concurrent 401s
//! cost one call to `token/refresh/`. The attempt itself runs on its own task
//! and finishes even if every waiter goes away.
//!
//! Markers live in a process-wide registry keyed by the credential store's
//! scope: every coordinator over the same storage shares one marker, even
//! when built by separate clients.

use super::client::REFRESH_PATH;
use super::credentials::CredentialStore;
use super::errors::{SessionError, SessionResult};
use super::transport::{ApiRequest, Transport};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use tracing::{debug, info, warn};

type RefreshAttempt = Shared<BoxFuture<'static, SessionResult<String>>>;

struct InFlight {
    generation: u64,
    attempt: RefreshAttempt,
}

// Never held across an await.
type Marker = Mutex<Option<InFlight>>;

static MARKERS: OnceLock<Mutex<HashMap<String, Weak<Marker>>>> = OnceLock::new();
static GENERATION: AtomicU64 = AtomicU64::new(0);

/// The marker shared by every coordinator over `scope`.
fn marker_for(scope: String) -> Arc<Marker> {
    let mut markers = MARKERS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(marker) = markers.get(&scope).and_then(Weak::upgrade) {
        return marker;
    }
    markers.retain(|_, marker| marker.strong_count() > 0);
    let marker = Arc::new(Mutex::new(None));
    markers.insert(scope, Arc::downgrade(&marker));
    marker
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    in_flight: Arc<Marker>,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn CredentialStore>) -> Self {
        let in_flight = marker_for(store.scope());
        Self {
            transport,
            store,
            in_flight,
        }
    }

    /// Returns a fresh access credential, joining the outstanding attempt if
    /// there is one. Must be called from within a tokio runtime.
    pub async fn refresh(&self) -> SessionResult<String> {
        let attempt = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(generation = in_flight.generation, "Joining outstanding refresh");
                    in_flight.attempt.clone()
                }
                None => {
                    let generation = GENERATION.fetch_add(1, Ordering::SeqCst) + 1;
                    let attempt = self.start(generation);
                    *slot = Some(InFlight {
                        generation,
                        attempt: attempt.clone(),
                    });
                    attempt
                }
            }
        };
        attempt.await
    }

    /// Whether an attempt is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn start(&self, generation: u64) -> RefreshAttempt {
        let this = self.clone();
        let task = tokio::spawn(async move {
            let result = this.exchange().await;
            this.finish(generation);
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(SessionError::refresh_denied(format!(
                    "refresh task failed: {}",
                    e
                )))
            })
        }
        .boxed()
        .shared()
    }

    /// Returns the marker to idle, unless a newer attempt already owns it.
    fn finish(&self, generation: u64) {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().map(|f| f.generation) == Some(generation) {
            *slot = None;
        }
    }

    async fn exchange(&self) -> SessionResult<String> {
        let Some(refresh) = self.store.get_refresh() else {
            info!("No refresh credential; ending session");
            self.store.clear();
            return Err(SessionError::refresh_denied("no refresh credential"));
        };

        let request = ApiRequest::post(REFRESH_PATH, serde_json::json!({ "refresh": refresh }));
        let outcome = match self.transport.send(&request).await {
            Ok(response) if response.is_success() => response
                .json::<RefreshResponse>()
                .map(|body| body.access)
                .map_err(|e| e.to_string())
                .and_then(|access| {
                    if access.is_empty() {
                        Err("empty access credential".to_string())
                    } else {
                        Ok(access)
                    }
                }),
            Ok(response) => Err(format!("authority answered {}", response.status)),
            Err(e) => Err(e.to_string()),
        };

        // A login may have replaced the pair while we were suspended; its
        // credentials win over ours. The store checks and writes in one step.
        match outcome {
            Ok(access) => {
                if self.store.replace_if_refresh(&refresh, Some(&access)) {
                    info!("Access credential refreshed");
                    Ok(access)
                } else {
                    debug!("Credentials replaced during refresh; keeping the newer pair");
                    self.store.get().ok_or_else(|| {
                        SessionError::refresh_denied("credentials replaced during refresh")
                    })
                }
            }
            Err(reason) => {
                warn!(reason = %reason, "Refresh failed; ending session");
                self.store.replace_if_refresh(&refresh, None);
                Err(SessionError::refresh_denied(reason))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/refresh_tests.rs"]
mod tests;
