use std::sync::Arc;

use fanout_core::{BatchId, Report, StatusCounts, TaskState};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};

use crate::{TaskEvent, messages::BatchCommand};

/// Point-in-time view of a batch, as returned by `Scheduler::poll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStatus {
    pub batch_id: BatchId,
    pub total: usize,
    pub counts: StatusCounts,
    /// Every task has reached a terminal state.
    pub terminal: bool,
    pub cancel_requested: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct BatchSnapshot {
    pub(crate) status: BatchStatus,
    pub(crate) tasks: Vec<TaskState>,
    pub(crate) report: Option<Arc<Report>>,
}

impl BatchSnapshot {
    pub(crate) fn new(batch_id: BatchId, tasks: Vec<TaskState>, cancel_requested: bool) -> Self {
        let counts = StatusCounts::from_states(&tasks);
        let terminal = tasks.iter().all(TaskState::is_terminal);
        Self {
            status: BatchStatus {
                batch_id,
                total: tasks.len(),
                counts,
                terminal,
                cancel_requested,
            },
            tasks,
            report: None,
        }
    }
}

/// Reference to a submitted batch. Cheap to clone; dropping every handle
/// does not stop the batch.
///
/// The handle keeps the batch's event channel open, so a subscriber sees
/// `Closed` only once every handle is dropped and the batch is finished.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    pub(crate) id: BatchId,
    pub(crate) snapshots: watch::Receiver<BatchSnapshot>,
    pub(crate) commands: mpsc::Sender<BatchCommand>,
    pub(crate) events: broadcast::Sender<TaskEvent>,
}

impl BatchHandle {
    pub fn id(&self) -> &BatchId {
        &self.id
    }
}
