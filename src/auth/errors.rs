//! Failures surfaced by the authenticated request path.

use std::fmt::{Display, Formatter};

/// Errors returned by the session client and the refresh coordinator.
///
/// `Clone` so a single refresh failure can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Network failure; the request never produced a response.
    Transport { message: String },
    /// The login endpoint rejected the username/password.
    InvalidCredentials,
    /// No refresh credential, or the authority rejected it. Credentials are cleared.
    RefreshDenied { reason: String },
    /// Still 401 after one refresh and retry. Credentials are cleared.
    AuthDenied,
    /// Any other non-success response, for callers that asked for one.
    Status { status: u16, body: String },
}

impl SessionError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn refresh_denied(reason: impl Into<String>) -> Self {
        Self::RefreshDenied {
            reason: reason.into(),
        }
    }

    /// Whether the authenticated session is over and the user must log in again.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::RefreshDenied { .. } | Self::AuthDenied)
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { message } => write!(f, "transport error: {}", message),
            Self::InvalidCredentials => write!(f, "invalid username or password"),
            Self::RefreshDenied { reason } => write!(f, "refresh denied: {}", reason),
            Self::AuthDenied => write!(f, "authorization denied after credential refresh"),
            Self::Status { status, body } => {
                if body.is_empty() {
                    write!(f, "request failed with status {}", status)
                } else {
                    write!(f, "request failed with status {}: {}", status, body)
                }
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Result type for authenticated request operations.
pub type SessionResult<T> = Result<T, SessionError>;
