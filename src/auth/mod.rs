//! Credentialed access to the shift API.
//!
//! `SessionClient` attaches the stored access credential to every request
//! and repairs an expired one through the shared `RefreshCoordinator`.

pub mod client;
pub mod credentials;
pub mod errors;
pub mod refresh;
pub mod transport;

pub use client::SessionClient;
pub use credentials::FileCredentialStore;
pub use transport::{ApiRequest, ApiResponse, Method, UreqTransport};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
