//! Authorised request execution with one-shot credential repair.

use super::credentials::CredentialStore;
use super::errors::{SessionError, SessionResult};
use super::refresh::RefreshCoordinator;
use super::transport::{ApiRequest, ApiResponse, Transport};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Exchanges username/password for a credential pair.
pub const LOGIN_PATH: &str = "token/";
/// Exchanges the refresh credential for a new access credential.
pub const REFRESH_PATH: &str = "token/refresh/";

#[derive(Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
}

#[derive(Clone)]
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    refresher: RefreshCoordinator,
}

impl SessionClient {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn CredentialStore>) -> Self {
        let refresher = RefreshCoordinator::new(Arc::clone(&transport), Arc::clone(&store));
        Self {
            transport,
            store,
            refresher,
        }
    }

    /// Sends `request` with the stored access credential.
    ///
    /// A 401 triggers one refresh (shared with any concurrent caller) and one
    /// resend of the original request. Every other response, success or not,
    /// is returned unchanged.
    ///
    /// # Errors
    ///
    /// - `Transport` when no response was received
    /// - `RefreshDenied` when the credential could not be repaired
    /// - `AuthDenied` when the resent request is rejected again
    pub async fn execute(&self, request: ApiRequest) -> SessionResult<ApiResponse> {
        if request.is_credential_exchange() {
            return self.transport.send(&request).await;
        }

        let sent_with = self.store.get();
        let first = self
            .transport
            .send(&request.clone().with_bearer(sent_with.clone()))
            .await?;
        if !first.is_unauthorized() {
            return Ok(first);
        }

        // Read the store again: another caller may have repaired it while we waited.
        let access = match self.store.get() {
            Some(current) if Some(&current) != sent_with.as_ref() => {
                debug!(path = %request.path, "Retrying with credential refreshed elsewhere");
                current
            }
            _ => {
                debug!(
                    path = %request.path,
                    joining = self.refresher.is_refreshing(),
                    "Unauthorized; refreshing credential"
                );
                self.refresher.refresh().await?
            }
        };

        let retried = self
            .transport
            .send(&request.clone().with_bearer(Some(access)))
            .await?;
        if retried.is_unauthorized() {
            warn!(path = %request.path, "Still unauthorized after refresh; ending session");
            self.store.clear();
            return Err(SessionError::AuthDenied);
        }
        Ok(retried)
    }

    /// Obtains and stores a new credential pair.
    pub async fn login(&self, username: &str, password: &str) -> SessionResult<()> {
        let request = ApiRequest::post(
            LOGIN_PATH,
            serde_json::json!({ "username": username, "password": password }),
        );
        let response = self.transport.send(&request).await?;
        if matches!(response.status, 400 | 401) {
            return Err(SessionError::InvalidCredentials);
        }
        let response = response.error_for_status()?;

        let pair: LoginResponse = response.json()?;
        if pair.access.is_empty() {
            return Err(SessionError::InvalidCredentials);
        }
        self.store.set(&pair.access, &pair.refresh);
        info!(username = %username, "Logged in");
        Ok(())
    }

    pub fn logout(&self) {
        self.store.clear();
        info!("Logged out");
    }

    pub fn is_logged_in(&self) -> bool {
        self.store.get().is_some()
    }
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
