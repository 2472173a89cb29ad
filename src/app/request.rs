//! `request` command: one authorised call through the session client.

use crate::auth::{ApiRequest, ApiResponse, Method, SessionClient};
use anyhow::{bail, Context, Result};
use serde_json::Value;

pub async fn run_request(
    client: &SessionClient,
    method: Method,
    path: &str,
    data: Option<&str>,
) -> Result<()> {
    let body = fetch(client, method, path, data).await?;
    println!("{}", body);
    Ok(())
}

/// Executes the request and returns the rendered response body.
async fn fetch(
    client: &SessionClient,
    method: Method,
    path: &str,
    data: Option<&str>,
) -> Result<String> {
    let mut request = ApiRequest::new(method, path);
    if let Some(data) = data {
        let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
        request = request.with_body(body);
    }

    match client
        .execute(request)
        .await
        .and_then(ApiResponse::error_for_status)
    {
        Ok(response) => Ok(render_body(&response.body)),
        Err(e) if e.requires_login() => {
            bail!("{}. Run `shiftmon login <username>` to sign in again", e)
        }
        Err(e) => Err(e).with_context(|| format!("{} {} failed", method, path)),
    }
}

/// Pretty-prints JSON bodies; anything else is returned as-is.
fn render_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{expiring_api, respond, MemoryCredentialStore, MockTransport};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_render_body() {
        assert_eq!(render_body(r#"{"id":7}"#), "{\n  \"id\": 7\n}");
        assert_eq!(render_body("plain text"), "plain text");
        assert_eq!(render_body(""), "");
    }

    #[tokio::test]
    async fn test_fetch_sends_body_and_renders_response() {
        let transport = Arc::new(MockTransport::new(|_| respond(200, json!({ "ok": true }))));
        let client = SessionClient::new(
            transport.clone(),
            Arc::new(MemoryCredentialStore::with_pair("a1", "r1")),
        );

        let body = fetch(&client, Method::Post, "shifts/", Some(r#"{"line":2}"#))
            .await
            .expect("request succeeds");

        assert_eq!(body, "{\n  \"ok\": true\n}");
        assert_eq!(transport.requests()[0].body, Some(json!({ "line": 2 })));
    }

    #[tokio::test]
    async fn test_fetch_points_to_login_when_session_ended() {
        let client = SessionClient::new(
            Arc::new(MockTransport::new(expiring_api("never-valid", "fresh"))),
            Arc::new(MemoryCredentialStore::with_pair("expired", "r1")),
        );

        let err = fetch(&client, Method::Get, "shifts/", None)
            .await
            .expect_err("session over");
        assert!(err.to_string().contains("shiftmon login"));
    }

    #[tokio::test]
    async fn test_fetch_reports_status_errors() {
        let client = SessionClient::new(
            Arc::new(MockTransport::new(|_| respond(404, json!({ "detail": "Not found." })))),
            Arc::new(MemoryCredentialStore::with_pair("a1", "r1")),
        );

        let err = fetch(&client, Method::Get, "shifts/99/", None)
            .await
            .expect_err("404");
        assert_eq!(err.to_string(), "GET shifts/99/ failed");
        assert!(format!("{:#}", err).contains("404"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_json_data() {
        let client = SessionClient::new(
            Arc::new(MockTransport::new(|_| respond(200, json!({})))),
            Arc::new(MemoryCredentialStore::default()),
        );

        let err = fetch(&client, Method::Post, "shifts/", Some("{oops"))
            .await
            .expect_err("bad data");
        assert!(err.to_string().contains("--data"));
    }
}
