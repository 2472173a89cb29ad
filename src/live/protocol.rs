//! Envelopes received on the live shift feed.
//!
//! Every frame is one JSON object with a `type` discriminator:
//!
//! ```text
//! { "type": "shift_init",   "data": { "shift": Session, "tasks": [ActiveTask, ...] } }
//! { "type": "task_update",  "task_id": 2, "event": "update", "data": Partial<ActiveTask> }
//! { "type": "shift_update", "event": "completed" | "new_task" | null, "data": ... }
//! ```
//!
//! Decoding is two-step: the discriminator is read first so an unknown
//! `type` becomes `Envelope::Unknown` rather than a decode failure.

use super::model::{lenient, ActiveTask, Session, TaskId};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

pub const SHIFT_INIT: &str = "shift_init";
pub const TASK_UPDATE: &str = "task_update";
pub const SHIFT_UPDATE: &str = "shift_update";

/// `shift_update` event marking the end of the shift.
pub const EVENT_COMPLETED: &str = "completed";
/// `shift_update` event announcing the next task of a running shift.
pub const EVENT_NEW_TASK: &str = "new_task";

/// One decoded feed message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    ShiftInit(InitPayload),
    TaskUpdate(TaskDelta),
    ShiftUpdate(ShiftDelta),
    /// Well-formed frame with a discriminator this build does not handle.
    Unknown { kind: String },
}

impl Envelope {
    /// The wire discriminator, for logging.
    pub fn kind(&self) -> &str {
        match self {
            Envelope::ShiftInit(_) => SHIFT_INIT,
            Envelope::TaskUpdate(_) => TASK_UPDATE,
            Envelope::ShiftUpdate(_) => SHIFT_UPDATE,
            Envelope::Unknown { kind } => kind,
        }
    }
}

/// Full state of the running shift.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InitPayload {
    pub shift: Session,
    /// Every task of the shift, in order.
    #[serde(default)]
    pub tasks: Vec<ActiveTask>,
    /// Producers that only send the current task embed it here.
    #[serde(default)]
    pub task: Option<ActiveTask>,
}

/// Partial update of the active task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskDelta {
    /// Task the producer addressed, when it says.
    pub task_id: Option<TaskId>,
    /// Producer-side event (`start`, `update`, `finish`); informational.
    pub event: Option<String>,
    pub patch: ActiveTask,
}

impl TaskDelta {
    /// The addressed task: the envelope's `task_id`, else the patch's own `id`.
    pub fn target(&self) -> Option<TaskId> {
        self.task_id.or(self.patch.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShiftDelta {
    /// The shift ended; the view is cleared and a reload is requested.
    Completed,
    /// The shift moved on to its next task.
    NewTask {
        shift: Session,
        task: Option<ActiveTask>,
    },
    /// Partial update of the shift itself.
    Patch(Session),
}

/// Why a frame could not be turned into an `Envelope`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not JSON, no `type`, or a payload of the wrong shape.
    Malformed(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Malformed(reason) => write!(f, "Malformed frame: {}", reason),
        }
    }
}

impl std::error::Error for FrameError {}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    event: Option<String>,
    #[serde(default, deserialize_with = "lenient::int")]
    task_id: Option<TaskId>,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct NewTaskPayload {
    #[serde(default)]
    shift: Session,
    #[serde(default)]
    task: Option<ActiveTask>,
}

/// Decodes one text frame.
pub fn decode_frame(text: &str) -> Result<Envelope, FrameError> {
    let raw: RawEnvelope =
        serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;

    match raw.kind.as_str() {
        SHIFT_INIT => Ok(Envelope::ShiftInit(payload(raw.data, SHIFT_INIT)?)),
        TASK_UPDATE => Ok(Envelope::TaskUpdate(TaskDelta {
            task_id: raw.task_id,
            event: raw.event,
            patch: optional_payload(raw.data, TASK_UPDATE)?,
        })),
        SHIFT_UPDATE => {
            let delta = match raw.event.as_deref() {
                Some(EVENT_COMPLETED) => ShiftDelta::Completed,
                Some(EVENT_NEW_TASK) => {
                    let next: NewTaskPayload = payload(raw.data, SHIFT_UPDATE)?;
                    ShiftDelta::NewTask {
                        shift: next.shift,
                        task: next.task,
                    }
                }
                _ => ShiftDelta::Patch(optional_payload(raw.data, SHIFT_UPDATE)?),
            };
            Ok(Envelope::ShiftUpdate(delta))
        }
        _ => Ok(Envelope::Unknown { kind: raw.kind }),
    }
}

fn payload<T: serde::de::DeserializeOwned>(data: Value, kind: &str) -> Result<T, FrameError> {
    serde_json::from_value(data)
        .map_err(|e| FrameError::Malformed(format!("invalid {} payload: {}", kind, e)))
}

/// Like `payload`, but a missing `data` means an empty patch.
fn optional_payload<T>(data: Value, kind: &str) -> Result<T, FrameError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if data.is_null() {
        Ok(T::default())
    } else {
        payload(data, kind)
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
