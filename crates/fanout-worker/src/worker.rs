use std::fmt;
use std::sync::Arc;

use fanout_core::TaskSpec;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{ExecutionError, Executor};

/// Result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Vec<u8>),
    Failure(ExecutionError),
    TimedOut,
}

impl Outcome {
    fn from_join(joined: Result<Result<Vec<u8>, ExecutionError>, JoinError>) -> Self {
        match joined {
            Ok(Ok(result)) => Outcome::Success(result),
            Ok(Err(error)) => Outcome::Failure(error),
            Err(err) if err.is_panic() => Outcome::Failure(ExecutionError::new("executor panicked")),
            Err(_) => Outcome::Failure(ExecutionError::new("execution aborted")),
        }
    }
}

/// What a worker hands back after one attempt.
#[derive(Debug)]
pub struct Attempt {
    pub outcome: Outcome,
    /// Present when the attempt timed out while its execution was still going.
    pub straggler: Option<Straggler>,
}

/// An execution that outlived its timeout. The worker stopped waiting for
/// it but nothing forces it to stop.
#[derive(Debug)]
pub struct Straggler {
    handle: JoinHandle<Result<Vec<u8>, ExecutionError>>,
}

impl Straggler {
    /// Waits for the late result.
    pub async fn join(self) -> Outcome {
        Outcome::from_join(self.handle.await)
    }
}

/// Executes task attempts with one executor, enforcing the task's timeout.
///
/// Errors from the executor, including panics, come back as
/// [`Outcome::Failure`]; nothing is propagated past the worker.
#[derive(Clone)]
pub struct Worker {
    executor: Arc<dyn Executor>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker").finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }

    /// Runs one attempt of `spec`.
    ///
    /// On timeout `cancel` is fired as a best-effort signal and the still
    /// running execution is returned as a [`Straggler`].
    pub async fn run(&self, spec: &TaskSpec, cancel: CancellationToken) -> Attempt {
        debug!(task_id = %spec.id, timeout_ms = spec.timeout.as_millis(), "attempt started");

        let executor = Arc::clone(&self.executor);
        let payload = spec.payload.clone();
        let token = cancel.clone();
        let mut handle = tokio::spawn(async move { executor.execute(payload, token).await });

        match tokio::time::timeout(spec.timeout, &mut handle).await {
            Ok(joined) => {
                let outcome = Outcome::from_join(joined);
                debug!(task_id = %spec.id, success = matches!(outcome, Outcome::Success(_)), "attempt finished");
                Attempt {
                    outcome,
                    straggler: None,
                }
            }
            Err(_) => {
                cancel.cancel();
                warn!(task_id = %spec.id, timeout_ms = spec.timeout.as_millis(), "attempt timed out");
                Attempt {
                    outcome: Outcome::TimedOut,
                    straggler: Some(Straggler { handle }),
                }
            }
        }
    }
}
