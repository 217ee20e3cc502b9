use serde::{Deserialize, Serialize};

use crate::{TaskState, TaskStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OverallStatus {
    Success,
    PartialFailure,
    Failure,
}

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a TaskState>) -> Self {
        let mut counts = Self::default();
        for state in states {
            counts.record(state.status);
        }
        counts
    }

    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::TimedOut => self.timed_out += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.succeeded + self.failed + self.timed_out + self.cancelled
    }
}

/// Consolidated, read-only outcome of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
    pub(crate) total: usize,
    pub(crate) counts: StatusCounts,
    pub(crate) overall_status: OverallStatus,
    /// Set when the batch was cut short and some tasks carry a synthetic
    /// cancellation that the scheduler never recorded.
    pub(crate) truncated: bool,
    pub(crate) tasks: Vec<TaskState>,
}

impl Report {
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn counts(&self) -> &StatusCounts {
        &self.counts
    }

    pub fn overall_status(&self) -> OverallStatus {
        self.overall_status
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Per-task states in submission order.
    pub fn tasks(&self) -> &[TaskState] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&TaskState> {
        self.tasks.iter().find(|state| state.id.as_str() == id)
    }
}
