use serde::{Deserialize, Serialize};

use crate::{BatchId, TaskSpec};

/// Task specs submitted together under one concurrency limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    pub id: BatchId,
    /// Submission order, which is also the FIFO tie-break among equal priorities.
    pub tasks: Vec<TaskSpec>,
}

impl Batch {
    pub fn new(tasks: Vec<TaskSpec>) -> Self {
        Self {
            id: BatchId::new(),
            tasks,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl From<Vec<TaskSpec>> for Batch {
    fn from(tasks: Vec<TaskSpec>) -> Self {
        Self::new(tasks)
    }
}

impl FromIterator<TaskSpec> for Batch {
    fn from_iter<I: IntoIterator<Item = TaskSpec>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
