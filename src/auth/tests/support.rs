//! In-memory fakes for the auth path.

use super::client::REFRESH_PATH;
use super::credentials::CredentialStore;
use super::errors::SessionResult;
use super::transport::{ApiRequest, ApiResponse, Transport};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&ApiRequest) -> SessionResult<ApiResponse> + Send + Sync>;

/// Transport answering from a closure and recording every request.
pub struct MockTransport {
    respond: Responder,
    latency: Duration,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new(
        respond: impl Fn(&ApiRequest) -> SessionResult<ApiResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Delays every answer, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> SessionResult<ApiResponse> {
        self.calls.lock().unwrap().push(request.clone());
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
        (self.respond)(request)
    }
}

pub fn respond(status: u16, body: Value) -> SessionResult<ApiResponse> {
    Ok(ApiResponse {
        status,
        body: body.to_string(),
    })
}

/// API that accepts only `accepted` as bearer and issues `issued` on refresh.
pub fn expiring_api(
    accepted: &'static str,
    issued: &'static str,
) -> impl Fn(&ApiRequest) -> SessionResult<ApiResponse> + Send + Sync + 'static {
    move |request| {
        if request.path == REFRESH_PATH {
            respond(200, json!({ "access": issued }))
        } else if request.bearer.as_deref() == Some(accepted) {
            respond(200, json!({ "path": request.path }))
        } else {
            respond(401, json!({ "detail": "Given token not valid for any token type" }))
        }
    }
}

static NEXT_MEMORY_SCOPE: AtomicU64 = AtomicU64::new(0);

/// Each instance is its own scope, so parallel tests never share a marker.
pub struct MemoryCredentialStore {
    scope: u64,
    pair: Mutex<(Option<String>, Option<String>)>,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self {
            scope: NEXT_MEMORY_SCOPE.fetch_add(1, Ordering::SeqCst),
            pair: Mutex::new((None, None)),
        }
    }
}

impl MemoryCredentialStore {
    pub fn with_pair(access: &str, refresh: &str) -> Self {
        let store = Self::default();
        store.set(access, refresh);
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn set(&self, access: &str, refresh: &str) {
        let non_empty = |v: &str| Some(v.to_string()).filter(|v| !v.is_empty());
        *self.pair.lock().unwrap() = (non_empty(access), non_empty(refresh));
    }

    fn get(&self) -> Option<String> {
        self.pair.lock().unwrap().0.clone()
    }

    fn get_refresh(&self) -> Option<String> {
        self.pair.lock().unwrap().1.clone()
    }

    fn clear(&self) {
        *self.pair.lock().unwrap() = (None, None);
    }

    fn replace_if_refresh(&self, expected_refresh: &str, access: Option<&str>) -> bool {
        let mut pair = self.pair.lock().unwrap();
        if pair.1.as_deref() != Some(expected_refresh) {
            return false;
        }
        *pair = match access {
            Some(access) => (Some(access.to_string()), pair.1.take()),
            None => (None, None),
        };
        true
    }

    fn scope(&self) -> String {
        format!("memory:{}", self.scope)
    }
}
