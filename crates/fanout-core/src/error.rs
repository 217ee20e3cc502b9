use thiserror::Error;

use crate::{BatchId, TaskId, TaskStatus};

/// Reasons a batch is rejected at submission. The batch never starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidBatch {
    #[error("duplicate task id `{0}`")]
    DuplicateTaskId(TaskId),

    #[error("concurrency limit must be at least 1, got {0}")]
    ConcurrencyLimit(usize),

    #[error("task `{task_id}` requests unknown capability `{capability}`")]
    UnknownCapability { task_id: TaskId, capability: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid batch: {0}")]
    InvalidBatch(#[from] InvalidBatch),

    /// The batch keeps running; the caller decides whether to cancel.
    #[error("deadline exceeded while waiting for batch {batch_id}")]
    DeadlineExceeded { batch_id: BatchId },

    #[error("cannot aggregate: task `{task_id}` is still {status}")]
    IncompleteBatch { task_id: TaskId, status: TaskStatus },

    #[error("scheduling loop for batch {batch_id} stopped without a report")]
    SchedulerStopped { batch_id: BatchId },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum TaskTransitionError {
    #[error("illegal task transition from {from} to {to}")]
    Illegal {
        from: &'static str,
        to: &'static str,
    },

    #[error("task `{task_id}` has no retries left ({attempts} attempts, {max_retries} retries allowed)")]
    RetriesExhausted {
        task_id: TaskId,
        attempts: u32,
        max_retries: u32,
    },
}
