//! Tests for the watch loop against a local websocket server.

use super::*;
use crate::config::ReconnectPolicy;
use futures::SinkExt;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const INIT_FRAME: &str = r#"{"type":"shift_init","data":{"shift":{"id":7,"status":"ACTIVE","active_task":2},"tasks":[{"id":1},{"id":2,"type":"TASK","product":"Oats","packing":"1kg","ready_value":0,"target":100}]}}"#;
const UPDATE_FRAME: &str = r#"{"type":"task_update","task_id":2,"data":{"ready_value":"42","time_spent":90}}"#;

fn test_config(feed_url: String) -> MonitorConfig {
    MonitorConfig {
        feed_url,
        reload_delay_ms: 50,
        reconnect: ReconnectPolicy {
            enabled: false,
            ..ReconnectPolicy::default()
        },
        ..MonitorConfig::default()
    }
}

fn test_store(temp: &TempDir, config: &MonitorConfig) -> (SharedStore, Arc<StructuredLogger>) {
    let logger =
        Arc::new(StructuredLogger::new("watch-test", temp.path()).expect("Failed to create logger"));
    let (store, _) = LiveStore::new(config.reload_delay(), Arc::clone(&logger));
    (store.into_shared(), logger)
}

/// Serves `frames` on the first connection, then refuses every later handshake.
async fn serve(frames: Vec<&'static str>, hold_open: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        tokio::spawn(async move {
            let mut ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("handshake");
            for frame in frames {
                ws.send(Message::Text(frame.into())).await.expect("send");
            }
            if hold_open {
                tokio::time::sleep(Duration::from_secs(30)).await;
            } else {
                let _ = ws.close(None).await;
            }
        });
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    format!("ws://{}/ws/shift/", addr)
}

#[tokio::test]
async fn test_prints_view_changes_until_shutdown() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(serve(vec![INIT_FRAME, UPDATE_FRAME], true).await);
    let (store, logger) = test_store(&temp, &config);

    let mut lines = Vec::new();
    let mut collect = |line: &str| lines.push(line.to_string());
    let shutdown = tokio::time::sleep(Duration::from_millis(500));

    watch_feed(&config, store, logger, shutdown, &mut collect)
        .await
        .expect("shutdown is a clean exit");

    assert_eq!(lines.first().map(String::as_str), Some("no active shift"));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("shift #7 ACTIVE | task #2 Oats [1kg] 42/100 in 90s")
    );
}

#[tokio::test]
async fn test_lost_feed_without_reconnect_is_an_error() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(serve(vec![INIT_FRAME], false).await);
    let (store, logger) = test_store(&temp, &config);

    let mut lines = Vec::new();
    let mut collect = |line: &str| lines.push(line.to_string());
    let shutdown = tokio::time::sleep(Duration::from_secs(10));

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        watch_feed(&config, store, logger, shutdown, &mut collect),
    )
    .await
    .expect("watch should give up before the timeout");

    let err = result.expect_err("reconnect is disabled");
    assert!(err.to_string().contains("reconnect is disabled"));
}

#[tokio::test]
async fn test_completion_remounts_the_feed() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(
        serve(
            vec![
                INIT_FRAME,
                r#"{"type":"shift_update","event":"completed"}"#,
            ],
            true,
        )
        .await,
    );
    let (store, logger) = test_store(&temp, &config);

    let mut lines = Vec::new();
    let mut collect = |line: &str| lines.push(line.to_string());
    let shutdown = tokio::time::sleep(Duration::from_secs(10));

    // The remount hits the refusing server, and with reconnect disabled the loop ends.
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        watch_feed(&config, store, logger.clone(), shutdown, &mut collect),
    )
    .await
    .expect("watch should end before the timeout");

    assert!(result.is_err());
    assert!(lines.iter().any(|line| line == "shift completed, reloading"));

    let journal = std::fs::read_to_string(logger.path()).expect("journal");
    assert!(journal.contains("\"SessionCompleted\""));
    assert!(journal.contains("\"run_id\":2"));
}
