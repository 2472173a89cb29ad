//! Pure fold of feed envelopes into the live view.
//!
//! `reduce` never performs I/O and never fails: every envelope maps to a new
//! view plus the events describing what happened. Side effects (journal,
//! reload scheduling, broadcast) belong to the store.

use super::model::{ActiveTask, LiveView, Session, TaskId};
use super::protocol::{Envelope, InitPayload, ShiftDelta, TaskDelta};
use serde::Serialize;

/// Why a task update left the view untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// The addressed task is not in the shift's task list.
    UnknownTask,
    /// The addressed task exists but is not the one being worked.
    NotActive,
}

/// What a single envelope did to the view.
/// Used for journaling and for the store's reload decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    SessionInitialized {
        session_id: Option<i64>,
        active_task_id: Option<TaskId>,
    },
    TaskMerged {
        task_id: Option<TaskId>,
    },
    /// A delta arrived with no active task and became the active task.
    TaskAdopted {
        task_id: Option<TaskId>,
    },
    TaskUpdateIgnored {
        task_id: TaskId,
        reason: IgnoreReason,
    },
    SessionMerged {
        session_id: Option<i64>,
    },
    SessionAdopted {
        session_id: Option<i64>,
    },
    /// The active task no longer belongs to the (patched) session.
    ActiveTaskDropped {
        task_id: TaskId,
    },
    NextTaskStarted {
        task_id: Option<TaskId>,
    },
    SessionCompleted {
        session_id: Option<i64>,
    },
    EnvelopeIgnored {
        kind: String,
    },
}

/// Folds one envelope into `view`.
pub fn reduce(view: LiveView, envelope: Envelope) -> (LiveView, Vec<FeedEvent>) {
    match envelope {
        Envelope::ShiftInit(init) => initialize(init),
        Envelope::TaskUpdate(delta) => apply_task_delta(view, delta),
        Envelope::ShiftUpdate(delta) => apply_shift_delta(view, delta),
        Envelope::Unknown { kind } => (view, vec![FeedEvent::EnvelopeIgnored { kind }]),
    }
}

fn initialize(init: InitPayload) -> (LiveView, Vec<FeedEvent>) {
    let InitPayload {
        mut shift,
        tasks,
        task,
    } = init;

    if shift.tasks.is_none() {
        let ids: Vec<TaskId> = if tasks.is_empty() {
            task.iter().filter_map(|t| t.id).collect()
        } else {
            tasks.iter().filter_map(|t| t.id).collect()
        };
        if !ids.is_empty() {
            shift.tasks = Some(ids);
        }
    }

    let active_task = resolve_active_task(&shift, tasks, task)
        .filter(|t| match t.id {
            Some(id) => shift.owns_task(id),
            None => true,
        });

    let event = FeedEvent::SessionInitialized {
        session_id: shift.id,
        active_task_id: active_task.as_ref().and_then(|t| t.id),
    };
    let view = LiveView {
        session: Some(shift),
        active_task,
    };
    (view, vec![event])
}

/// Picks the active task of a fresh shift: the embedded task if any, else the
/// task whose id matches `active_task`, else `active_task` read as an index,
/// else the first task.
fn resolve_active_task(
    shift: &Session,
    mut tasks: Vec<ActiveTask>,
    embedded: Option<ActiveTask>,
) -> Option<ActiveTask> {
    if embedded.is_some() {
        return embedded;
    }
    if tasks.is_empty() {
        return None;
    }

    let position = shift.active_task.and_then(|recorded| {
        tasks
            .iter()
            .position(|t| t.id == Some(recorded))
            .or_else(|| usize::try_from(recorded).ok().filter(|i| *i < tasks.len()))
    });
    Some(tasks.swap_remove(position.unwrap_or(0)))
}

fn apply_task_delta(mut view: LiveView, delta: TaskDelta) -> (LiveView, Vec<FeedEvent>) {
    let target = delta.target();
    let mut patch = delta.patch;

    if let Some(target) = target {
        if let Some(session) = &view.session {
            if !session.owns_task(target) {
                let event = FeedEvent::TaskUpdateIgnored {
                    task_id: target,
                    reason: IgnoreReason::UnknownTask,
                };
                return (view, vec![event]);
            }
        }
        let current = view.active_task.as_ref().and_then(|t| t.id);
        if current.is_some_and(|id| id != target) {
            let event = FeedEvent::TaskUpdateIgnored {
                task_id: target,
                reason: IgnoreReason::NotActive,
            };
            return (view, vec![event]);
        }
    }

    let event = match view.active_task.as_mut() {
        Some(task) => {
            task.merge(patch);
            FeedEvent::TaskMerged { task_id: task.id }
        }
        None => {
            if patch.id.is_none() {
                patch.id = target;
            }
            let event = FeedEvent::TaskAdopted { task_id: patch.id };
            view.active_task = Some(patch);
            event
        }
    };
    (view, vec![event])
}

fn apply_shift_delta(mut view: LiveView, delta: ShiftDelta) -> (LiveView, Vec<FeedEvent>) {
    match delta {
        ShiftDelta::Completed => {
            let session_id = view.session.as_ref().and_then(|s| s.id);
            (
                LiveView::default(),
                vec![FeedEvent::SessionCompleted { session_id }],
            )
        }
        ShiftDelta::Patch(patch) => {
            let mut events = vec![merge_session(&mut view, patch)];
            events.extend(prune_foreign_task(&mut view));
            (view, events)
        }
        ShiftDelta::NewTask { shift, task } => {
            let mut events = vec![merge_session(&mut view, shift)];
            if let Some(task) = task {
                let owned = match (&view.session, task.id) {
                    (Some(session), Some(id)) => session.owns_task(id),
                    _ => true,
                };
                if owned {
                    events.push(FeedEvent::NextTaskStarted { task_id: task.id });
                    view.active_task = Some(task);
                } else if let Some(id) = task.id {
                    events.push(FeedEvent::TaskUpdateIgnored {
                        task_id: id,
                        reason: IgnoreReason::UnknownTask,
                    });
                }
            }
            events.extend(prune_foreign_task(&mut view));
            (view, events)
        }
    }
}

fn merge_session(view: &mut LiveView, patch: Session) -> FeedEvent {
    match view.session.as_mut() {
        Some(session) => {
            session.merge(patch);
            FeedEvent::SessionMerged {
                session_id: session.id,
            }
        }
        None => {
            let event = FeedEvent::SessionAdopted {
                session_id: patch.id,
            };
            view.session = Some(patch);
            event
        }
    }
}

/// Drops the active task when the session's task list stopped naming it.
fn prune_foreign_task(view: &mut LiveView) -> Option<FeedEvent> {
    let session = view.session.as_ref()?;
    let task_id = view.active_task.as_ref()?.id?;
    if session.owns_task(task_id) {
        return None;
    }
    view.active_task = None;
    Some(FeedEvent::ActiveTaskDropped { task_id })
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;
