use std::time::Duration;

use fanout_core::{CancelReason, TaskId};
use serde::Serialize;

/// One state transition inside a batch, broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub attempt: u32,
    pub kind: TaskEventKind,
    /// Tasks of this batch in the Running state right after the transition.
    pub running: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEventKind {
    Dispatched,
    Succeeded,
    Failed { message: String },
    TimedOut,
    RetryScheduled { delay: Duration },
    Cancelled { reason: CancelReason },
    /// A result arrived for an attempt the scheduler had already settled.
    LateResultDiscarded,
}
