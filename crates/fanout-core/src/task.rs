use std::fmt::{self, Display};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{TaskId, TaskTransitionError};

/// Capability used when a task does not name one.
pub const DEFAULT_CAPABILITY: &str = "default";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable description of one unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: TaskId,
    /// Opaque to everything except the executor.
    pub payload: Vec<u8>,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Higher runs first among ready tasks.
    pub priority: i32,
    /// Executor that runs this task, resolved once when the batch is submitted.
    pub capability: String,
}

impl TaskSpec {
    pub fn builder(payload: impl Into<Vec<u8>>) -> TaskSpecBuilder {
        TaskSpecBuilder {
            spec: TaskSpec {
                id: TaskId::new(),
                payload: payload.into(),
                timeout: DEFAULT_TIMEOUT,
                max_retries: 0,
                priority: 0,
                capability: DEFAULT_CAPABILITY.to_owned(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskSpecBuilder {
    spec: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn id(mut self, id: impl Into<TaskId>) -> Self {
        self.spec.id = id.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.spec.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.spec.max_retries = max_retries;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.spec.priority = priority;
        self
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.spec.capability = capability.into();
        self
    }

    pub fn build(self) -> TaskSpec {
        self.spec
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// `cancel` was called on the batch.
    Requested,
    /// The orchestrator's overall deadline elapsed.
    DeadlineExceeded,
}

/// Structured error info recorded on a Failed, TimedOut or Cancelled task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    Execution { message: String },
    TimedOut { after: Duration },
    Cancelled { reason: CancelReason },
}

impl Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Execution { message } => write!(f, "execution failed: {message}"),
            TaskError::TimedOut { after } => write!(f, "timed out after {}ms", after.as_millis()),
            TaskError::Cancelled { reason } => write!(f, "cancelled ({reason:?})"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Running => "Running",
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Failed => "Failed",
            TaskStatus::TimedOut => "TimedOut",
            TaskStatus::Cancelled => "Cancelled",
        }
    }

    pub fn mark_as_running(&self) -> Result<TaskStatus, TaskTransitionError> {
        match self {
            TaskStatus::Pending => Ok(TaskStatus::Running),
            status => Err(illegal(status, "Running")),
        }
    }

    pub fn mark_as_succeeded(&self) -> Result<TaskStatus, TaskTransitionError> {
        match self {
            TaskStatus::Running => Ok(TaskStatus::Succeeded),
            status => Err(illegal(status, "Succeeded")),
        }
    }

    pub fn mark_as_failed(&self) -> Result<TaskStatus, TaskTransitionError> {
        match self {
            TaskStatus::Running => Ok(TaskStatus::Failed),
            status => Err(illegal(status, "Failed")),
        }
    }

    pub fn mark_as_timed_out(&self) -> Result<TaskStatus, TaskTransitionError> {
        match self {
            TaskStatus::Running => Ok(TaskStatus::TimedOut),
            status => Err(illegal(status, "TimedOut")),
        }
    }

    /// Only a failed or timed-out attempt goes back to Pending.
    pub fn mark_as_pending(&self) -> Result<TaskStatus, TaskTransitionError> {
        match self {
            TaskStatus::Failed | TaskStatus::TimedOut => Ok(TaskStatus::Pending),
            status => Err(illegal(status, "Pending")),
        }
    }

    pub fn mark_as_cancelled(&self) -> Result<TaskStatus, TaskTransitionError> {
        match self {
            TaskStatus::Pending | TaskStatus::Running => Ok(TaskStatus::Cancelled),
            status => Err(illegal(status, "Cancelled")),
        }
    }
}

fn illegal(from: &TaskStatus, to: &'static str) -> TaskTransitionError {
    TaskTransitionError::Illegal {
        from: from.as_str(),
        to,
    }
}

/// Mutable record of one task, written only by the scheduler that owns its batch.
///
/// Timestamps are offsets from the moment the batch was submitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskState {
    pub id: TaskId,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Duration>,
}

impl TaskState {
    pub fn pending(spec: &TaskSpec) -> Self {
        Self {
            id: spec.id.clone(),
            status: TaskStatus::Pending,
            attempts: 0,
            max_retries: spec.max_retries,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Succeeded | TaskStatus::Cancelled => true,
            TaskStatus::Failed | TaskStatus::TimedOut => !self.can_retry(),
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }

    /// Whether another attempt fits in the retry budget.
    pub fn can_retry(&self) -> bool {
        self.attempts <= self.max_retries
    }

    /// Begins a new attempt.
    pub fn start(&mut self, at: Duration) -> Result<(), TaskTransitionError> {
        self.status = self.status.mark_as_running()?;
        self.attempts += 1;
        self.error = None;
        self.started_at = Some(at);
        self.finished_at = None;
        Ok(())
    }

    pub fn succeed(&mut self, result: Vec<u8>, at: Duration) -> Result<(), TaskTransitionError> {
        self.status = self.status.mark_as_succeeded()?;
        self.result = Some(result);
        self.finished_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, message: String, at: Duration) -> Result<(), TaskTransitionError> {
        self.status = self.status.mark_as_failed()?;
        self.error = Some(TaskError::Execution { message });
        self.finished_at = Some(at);
        Ok(())
    }

    pub fn time_out(&mut self, after: Duration, at: Duration) -> Result<(), TaskTransitionError> {
        self.status = self.status.mark_as_timed_out()?;
        self.error = Some(TaskError::TimedOut { after });
        self.finished_at = Some(at);
        Ok(())
    }

    /// Puts a failed or timed-out task back in line for another attempt.
    pub fn requeue(&mut self) -> Result<(), TaskTransitionError> {
        if !self.can_retry() {
            return Err(TaskTransitionError::RetriesExhausted {
                task_id: self.id.clone(),
                attempts: self.attempts,
                max_retries: self.max_retries,
            });
        }
        self.status = self.status.mark_as_pending()?;
        self.error = None;
        Ok(())
    }

    pub fn cancel(&mut self, reason: CancelReason, at: Duration) -> Result<(), TaskTransitionError> {
        self.status = self.status.mark_as_cancelled()?;
        self.error = Some(TaskError::Cancelled { reason });
        self.finished_at = Some(at);
        Ok(())
    }
}
