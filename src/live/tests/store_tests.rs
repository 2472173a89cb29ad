//! Tests for the live store.

use super::*;
use crate::live::protocol::decode_frame;
use std::fs;
use tempfile::TempDir;

const INIT_FRAME: &str = r#"{"type":"shift_init","data":{"shift":{"id":7,"status":"ACTIVE","active_task":2},"tasks":[{"id":1},{"id":2,"ready_value":0,"target":100}]}}"#;
const COMPLETED_FRAME: &str = r#"{"type":"shift_update","event":"completed"}"#;

/// Creates a store with a logger in a temp directory.
fn create_test_store() -> (LiveStore, watch::Receiver<LiveView>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let logger = Arc::new(
        StructuredLogger::new("test-journal", temp_dir.path()).expect("Failed to create logger"),
    );
    let (store, rx) = LiveStore::new(Duration::from_millis(1000), logger);
    (store, rx, temp_dir)
}

fn frame(text: &str) -> Envelope {
    decode_frame(text).expect("test frame should decode")
}

#[tokio::test]
async fn test_apply_broadcasts_new_view() {
    let (mut store, mut rx, _temp) = create_test_store();

    store.apply(frame(INIT_FRAME));

    assert!(rx.has_changed().unwrap());
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(&snapshot, store.view());
    assert_eq!(snapshot.active_task.and_then(|t| t.id), Some(2));
}

#[tokio::test]
async fn test_noop_envelope_does_not_notify() {
    let (mut store, mut rx, _temp) = create_test_store();
    store.apply(frame(INIT_FRAME));
    rx.borrow_and_update();

    let events = store.apply(frame(r#"{"type":"ping"}"#));
    assert_eq!(events.len(), 1);
    assert!(!rx.has_changed().unwrap());

    store.apply(frame(
        r#"{"type":"task_update","task_id":99,"data":{"ready_value":3}}"#,
    ));
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_completion_clears_view_and_arms_reload() {
    let (mut store, rx, _temp) = create_test_store();
    let mut reload = store.reload_signal();

    store.apply(frame(INIT_FRAME));
    assert!(!store.reload_pending());

    store.apply(frame(COMPLETED_FRAME));
    assert!(store.view().is_empty());
    assert!(rx.borrow().is_empty());
    assert!(store.reload_pending());
    assert!(*reload.borrow_and_update());

    tokio::time::sleep(Duration::from_millis(1001)).await;
    assert!(!store.reload_pending());
    assert!(reload.has_changed().unwrap());
    assert!(!*reload.borrow_and_update());
}

#[tokio::test]
async fn test_journal_records_envelopes_and_drops() {
    let (mut store, _rx, temp) = create_test_store();

    store.apply(frame(INIT_FRAME));
    store.record_dropped("Malformed frame: expected value");

    let content = fs::read_to_string(temp.path().join("events.jsonl")).expect("journal should exist");
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).expect("journal line is JSON"))
        .collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["event"]["type"], "Envelope");
    assert_eq!(lines[0]["event"]["kind"], "shift_init");
    assert_eq!(lines[1]["event"]["type"], "SessionInitialized");
    assert_eq!(lines[1]["event"]["active_task_id"], 2);
    assert_eq!(lines[2]["event"]["type"], "FrameDropped");
}
