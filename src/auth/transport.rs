//! HTTP request/response values and the blocking `ureq` transport.

use super::errors::{SessionError, SessionResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::client::{LOGIN_PATH, REFRESH_PATH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(format!("unsupported HTTP method: {}", other)),
        }
    }
}

/// One outbound request, relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Access credential; set by the session client, never by callers.
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    #[cfg(test)]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    /// Login and refresh calls must never enter the 401 repair path.
    pub fn is_credential_exchange(&self) -> bool {
        let path = self.path.trim_start_matches('/');
        path == LOGIN_PATH || path == REFRESH_PATH
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn json<T: DeserializeOwned>(&self) -> SessionResult<T> {
        serde_json::from_str(&self.body).map_err(|e| SessionError::Status {
            status: self.status,
            body: format!("unexpected response body: {}", e),
        })
    }

    /// Turns any non-2xx response into `SessionError::Status`.
    pub fn error_for_status(self) -> SessionResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SessionError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// Sends one request and returns whatever status came back.
/// Only network-level failures are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> SessionResult<ApiResponse>;
}

/// `ureq`-backed transport. Calls run on the blocking pool.
pub struct UreqTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            base_url: base_url.to_string(),
            agent,
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: &ApiRequest) -> SessionResult<ApiResponse> {
        let agent = self.agent.clone();
        let url = self.url_for(&request.path);
        let request = request.clone();

        tokio::task::spawn_blocking(move || send_blocking(&agent, &url, &request))
            .await
            .map_err(|e| SessionError::transport(format!("request task failed: {}", e)))?
    }
}

fn send_blocking(agent: &ureq::Agent, url: &str, request: &ApiRequest) -> SessionResult<ApiResponse> {
    let body = match &request.body {
        Some(value) => Some(
            serde_json::to_string(value)
                .map_err(|e| SessionError::transport(format!("invalid request body: {}", e)))?,
        ),
        None => None,
    };
    let bearer = request.bearer.as_deref();

    let result = match request.method {
        Method::Get => with_headers(agent.get(url), bearer).call(),
        Method::Delete => with_headers(agent.delete(url), bearer).call(),
        Method::Post => send_body(with_headers(agent.post(url), bearer), body.as_deref()),
        Method::Put => send_body(with_headers(agent.put(url), bearer), body.as_deref()),
        Method::Patch => send_body(with_headers(agent.patch(url), bearer), body.as_deref()),
    };

    let mut response = result
        .map_err(|e| SessionError::transport(format!("{} {}: {}", request.method, url, e)))?;
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| SessionError::transport(format!("failed to read response: {}", e)))?;

    Ok(ApiResponse { status, body })
}

fn with_headers<B>(builder: ureq::RequestBuilder<B>, bearer: Option<&str>) -> ureq::RequestBuilder<B> {
    let builder = builder
        .header(
            "User-Agent",
            &format!("shiftmon/{} ({})", env!("CARGO_PKG_VERSION"), crate::BUILD_SHA),
        )
        .header("Accept", "application/json");
    match bearer {
        Some(token) => builder.header("Authorization", &format!("Bearer {}", token)),
        None => builder,
    }
}

fn send_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&str>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.header("Content-Type", "application/json").send(body),
        None => builder.send_empty(),
    }
}
