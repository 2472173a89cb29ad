//! Structured JSONL journal of the live feed.
//!
//! This module provides machine-parseable logging with:
//! - Monotonic sequence numbers for ordering
//! - ISO 8601 timestamps with microsecond precision
//! - Journal and run IDs for correlation (one run per feed connection)
//! - Structured event data in JSON format

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::live::FeedEvent;

/// Structured JSONL logger for debugging and feed reconstruction.
pub struct StructuredLogger {
    journal_id: String,
    run_id: AtomicU64,
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

/// A single log entry in JSONL format.
#[derive(Serialize, serde::Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number (unique across the journal)
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds
    pub ts: String,
    pub journal_id: String,
    /// Run ID (increments on every feed reconnect)
    pub run_id: u64,
    /// Component that emitted the log
    pub component: String,
    /// Structured event data
    pub event: Value,
}

impl StructuredLogger {
    /// Creates a new structured logger.
    ///
    /// Logs are appended to `<logs_dir>/events.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The logs directory cannot be created
    /// - The log file cannot be opened
    pub fn new(journal_id: &str, logs_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join("events.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            journal_id: journal_id.to_string(),
            run_id: AtomicU64::new(1),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path,
        })
    }

    /// Increments the run ID (called when the feed reconnects).
    pub fn increment_run_id(&self) {
        self.run_id.fetch_add(1, Ordering::SeqCst);
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Logs a structured event.
    ///
    /// The event is serialized to JSON and written as a single line.
    /// This method is thread-safe.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            journal_id: self.journal_id.clone(),
            run_id: self.run_id.load(Ordering::SeqCst),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    /// Logs receipt of a decoded envelope.
    pub fn log_envelope(&self, envelope_seq: u64, kind: &str) {
        self.log(
            "Feed",
            serde_json::json!({
                "type": "Envelope",
                "envelope_seq": envelope_seq,
                "kind": kind
            }),
        );
    }

    /// Logs what the reducer did with an envelope.
    pub fn log_feed_event(&self, envelope_seq: u64, event: &FeedEvent) {
        let mut value = serde_json::to_value(event).unwrap_or(Value::Null);
        if let Value::Object(fields) = &mut value {
            fields.insert("envelope_seq".to_string(), envelope_seq.into());
        }
        self.log("Reducer", value);
    }

    /// Logs a frame that was dropped before reaching the reducer.
    pub fn log_frame_dropped(&self, reason: &str) {
        self.log(
            "Feed",
            serde_json::json!({
                "type": "FrameDropped",
                "reason": reason
            }),
        );
    }

    /// Logs a connection state transition.
    pub fn log_connection(&self, url: &str, state: &str) {
        self.log(
            "Connection",
            serde_json::json!({
                "type": "StateChanged",
                "url": url,
                "state": state
            }),
        );
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }

    pub fn journal_id(&self) -> &str {
        &self.journal_id
    }
}

#[cfg(test)]
#[path = "tests/structured_logger_tests.rs"]
mod tests;
