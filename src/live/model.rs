//! View model mirrored from the live shift feed.
//!
//! Both `Session` and `ActiveTask` double as their own partial form: every
//! field is optional, so the same type describes a full record from
//! `shift_init` and a field subset from a delta envelope. Merging copies
//! every field present in the patch and keeps the rest.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a task within a shift.
pub type TaskId = i64;

/// Lifecycle status of a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShiftStatus {
    Planned,
    Active,
    Paused,
    Completed,
    Cancelled,
    /// Any status text this build does not know about.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftStatus::Planned => write!(f, "PLANNED"),
            ShiftStatus::Active => write!(f, "ACTIVE"),
            ShiftStatus::Paused => write!(f, "PAUSED"),
            ShiftStatus::Completed => write!(f, "COMPLETED"),
            ShiftStatus::Cancelled => write!(f, "CANCELLED"),
            ShiftStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Discriminator of an `ActiveTask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskKind {
    Task,
    Break,
    #[serde(other)]
    Unknown,
}

/// The currently tracked shift.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(
        default,
        deserialize_with = "lenient::int",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ShiftStatus>,
    #[serde(
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<String>,
    /// Recorded active task: an identifier, or an index into `tasks` on
    /// older producers.
    #[serde(
        default,
        deserialize_with = "lenient::int",
        skip_serializing_if = "Option::is_none"
    )]
    pub active_task: Option<i64>,
    /// Ordered identifiers of the tasks planned for this shift.
    #[serde(
        default,
        deserialize_with = "lenient::id_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub tasks: Option<Vec<TaskId>>,
    /// Fields the core does not interpret (name, planned times, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Session {
    /// Shallow merge: every field present in `patch` replaces ours.
    pub fn merge(&mut self, patch: Session) {
        overwrite(&mut self.id, patch.id);
        overwrite(&mut self.status, patch.status);
        overwrite(&mut self.start_time, patch.start_time);
        overwrite(&mut self.active_task, patch.active_task);
        overwrite(&mut self.tasks, patch.tasks);
        merge_extra(&mut self.extra, patch.extra);
    }

    /// Whether `task_id` belongs to this shift. A shift whose task list is
    /// not known yet cannot reject anything.
    pub fn owns_task(&self, task_id: TaskId) -> bool {
        match &self.tasks {
            Some(ids) if !ids.is_empty() => ids.contains(&task_id),
            _ => true,
        }
    }
}

/// The task or break currently being executed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveTask {
    #[serde(
        default,
        deserialize_with = "lenient::int",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<TaskId>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TaskKind>,
    #[serde(
        default,
        deserialize_with = "lenient::int",
        skip_serializing_if = "Option::is_none"
    )]
    pub order: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub product: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub packing: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::int",
        skip_serializing_if = "Option::is_none"
    )]
    pub target: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::int",
        skip_serializing_if = "Option::is_none"
    )]
    pub ready_value: Option<i64>,
    /// Elapsed working time in seconds.
    #[serde(
        default,
        deserialize_with = "lenient::int",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_spent: Option<i64>,
    /// Expected units per minute.
    #[serde(
        default,
        deserialize_with = "lenient::float",
        skip_serializing_if = "Option::is_none"
    )]
    pub norm_in_minute: Option<f64>,
    /// Remaining break time in seconds.
    #[serde(
        default,
        deserialize_with = "lenient::int",
        skip_serializing_if = "Option::is_none"
    )]
    pub remaining_time: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::text",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Kind-specific view of an `ActiveTask`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskDetail<'a> {
    Task {
        product: Option<&'a str>,
        packing: Option<&'a str>,
        target: Option<i64>,
        ready_value: Option<i64>,
        time_spent: Option<i64>,
    },
    Break {
        remaining_time: Option<i64>,
    },
    /// Kind not reported (yet); a delta adopted before initialization.
    Unclassified,
}

impl ActiveTask {
    /// Shallow merge: every field present in `patch` replaces ours.
    pub fn merge(&mut self, patch: ActiveTask) {
        overwrite(&mut self.id, patch.id);
        overwrite(&mut self.kind, patch.kind);
        overwrite(&mut self.order, patch.order);
        overwrite(&mut self.product, patch.product);
        overwrite(&mut self.packing, patch.packing);
        overwrite(&mut self.target, patch.target);
        overwrite(&mut self.ready_value, patch.ready_value);
        overwrite(&mut self.time_spent, patch.time_spent);
        overwrite(&mut self.norm_in_minute, patch.norm_in_minute);
        overwrite(&mut self.remaining_time, patch.remaining_time);
        overwrite(&mut self.started_at, patch.started_at);
        overwrite(&mut self.finished_at, patch.finished_at);
        merge_extra(&mut self.extra, patch.extra);
    }

    pub fn detail(&self) -> TaskDetail<'_> {
        match self.kind {
            Some(TaskKind::Task) => TaskDetail::Task {
                product: self.product.as_deref(),
                packing: self.packing.as_deref(),
                target: self.target,
                ready_value: self.ready_value,
                time_spent: self.time_spent,
            },
            Some(TaskKind::Break) => TaskDetail::Break {
                remaining_time: self.remaining_time,
            },
            Some(TaskKind::Unknown) | None => TaskDetail::Unclassified,
        }
    }
}

/// What consuming views read: the current shift and its active task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveView {
    pub session: Option<Session>,
    pub active_task: Option<ActiveTask>,
}

impl LiveView {
    pub fn is_empty(&self) -> bool {
        self.session.is_none() && self.active_task.is_none()
    }

    /// One-line rendering for terminal output.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no active shift".to_string();
        }

        let mut parts = Vec::new();
        if let Some(session) = &self.session {
            let id = session
                .id
                .map(|id| format!("#{}", id))
                .unwrap_or_else(|| "#?".to_string());
            let status = session
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            parts.push(format!("shift {} {}", id, status));
        }

        if let Some(task) = &self.active_task {
            let id = task
                .id
                .map(|id| format!("#{}", id))
                .unwrap_or_else(|| "#?".to_string());
            parts.push(match task.detail() {
                TaskDetail::Task {
                    product,
                    packing,
                    target,
                    ready_value,
                    time_spent,
                    ..
                } => format!(
                    "task {} {} [{}] {}/{} in {}s",
                    id,
                    product.unwrap_or("-"),
                    packing.unwrap_or("-"),
                    ready_value.unwrap_or(0),
                    target.map(|t| t.to_string()).unwrap_or_else(|| "?".into()),
                    time_spent.unwrap_or(0)
                ),
                TaskDetail::Break { remaining_time } => format!(
                    "break {} {}s left",
                    id,
                    remaining_time.unwrap_or(0)
                ),
                TaskDetail::Unclassified => format!("task {}", id),
            });
        }

        parts.join(" | ")
    }
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn merge_extra(target: &mut BTreeMap<String, Value>, patch: BTreeMap<String, Value>) {
    for (key, value) in patch {
        if !value.is_null() {
            target.insert(key, value);
        }
    }
}

/// Deserializers for producers that send numbers as text.
///
/// Unparsable values become 0 instead of failing the envelope; `null` is
/// treated the same as an absent field.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(Option::<Value>::deserialize(deserializer)?.and_then(|v| as_int(&v)))
    }

    pub fn float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(Option::<Value>::deserialize(deserializer)?.and_then(|v| as_float(&v)))
    }

    pub fn text<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(
            Option::<Value>::deserialize(deserializer)?.and_then(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            }),
        )
    }

    /// Accepts `[1, "2"]`, a JSON-encoded list in a string, or `"1,2"`.
    pub fn id_list<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<i64>>, D::Error> {
        Ok(Option::<Value>::deserialize(deserializer)?.and_then(|v| as_id_list(&v)))
    }

    pub fn as_int(value: &Value) -> Option<i64> {
        match value {
            Value::Null => None,
            Value::Number(n) => Some(
                n.as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                    .unwrap_or(0),
            ),
            Value::String(s) => Some(parse_int(s)),
            _ => Some(0),
        }
    }

    pub fn as_float(value: &Value) -> Option<f64> {
        match value {
            Value::Null => None,
            Value::Number(n) => Some(n.as_f64().filter(|f| f.is_finite()).unwrap_or(0.0)),
            Value::String(s) => Some(
                s.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .unwrap_or(0.0),
            ),
            _ => Some(0.0),
        }
    }

    fn as_id_list(value: &Value) -> Option<Vec<i64>> {
        match value {
            Value::Null => None,
            Value::Array(items) => Some(items.iter().filter_map(as_int).collect()),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.starts_with('[') {
                    let parsed: Value = serde_json::from_str(trimmed).ok()?;
                    as_id_list(&parsed)
                } else {
                    Some(
                        trimmed
                            .split(',')
                            .map(str::trim)
                            .filter(|part| !part.is_empty())
                            .map(parse_int)
                            .collect(),
                    )
                }
            }
            _ => None,
        }
    }

    fn parse_int(text: &str) -> i64 {
        let trimmed = text.trim();
        trimmed
            .parse::<i64>()
            .ok()
            .or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f as i64)
            })
            .unwrap_or(0)
    }
}
