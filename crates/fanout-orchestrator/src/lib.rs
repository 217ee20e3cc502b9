//! Single entry point for running one batch to completion.
//!
//! ```no_run
//! use std::time::Duration;
//! use fanout_core::TaskSpec;
//! use fanout_orchestrator::Orchestrator;
//! use fanout_worker::from_fn;
//!
//! # async fn demo() -> fanout_core::Result<()> {
//! let orchestrator = Orchestrator::builder()
//!     .executor("default", from_fn(|payload, _| async move { Ok(payload) }))
//!     .build();
//!
//! let specs = vec![TaskSpec::builder(b"hello".to_vec()).build()];
//! let report = orchestrator.run_batch(specs, 4, Duration::from_secs(30)).await?;
//! println!("{:?}", report.overall_status());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use fanout_core::{
    Aggregator, Batch, CancelReason, Clock, Error, Report, Result, TaskError, TaskState,
    TaskStatus,
};
use fanout_scheduler::{BatchHandle, Scheduler, SchedulerBuilder, SchedulerConfig};
use fanout_worker::{Executor, ExecutorRegistry};
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Orchestrator {
    scheduler: Scheduler,
}

impl Orchestrator {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder {
            scheduler: Scheduler::builder(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Submits `specs`, waits up to `overall_deadline` and returns the report.
    ///
    /// Per-task failures only show up in the report. When the deadline passes
    /// the batch is cancelled and the report covers whatever finished; tasks
    /// still pending or running appear as `Cancelled(DeadlineExceeded)` and
    /// the overall status is `PartialFailure`.
    pub async fn run_batch(
        &self,
        specs: impl Into<Batch>,
        concurrency_limit: usize,
        overall_deadline: Duration,
    ) -> Result<Report> {
        let handle = self.submit(specs, concurrency_limit)?;
        self.finish(&handle, Instant::now() + overall_deadline).await
    }

    pub fn submit(&self, specs: impl Into<Batch>, concurrency_limit: usize) -> Result<BatchHandle> {
        self.scheduler.submit(specs, concurrency_limit)
    }

    /// Second half of [`Orchestrator::run_batch`] for a batch submitted with
    /// [`Orchestrator::submit`].
    pub async fn finish(&self, handle: &BatchHandle, deadline: Instant) -> Result<Report> {
        match self.scheduler.await_report(handle, deadline).await {
            Ok(report) => {
                info!(batch_id = %handle.id(), overall = ?report.overall_status(), "batch complete");
                Ok(report)
            }
            Err(Error::DeadlineExceeded { batch_id }) => {
                warn!(%batch_id, "overall deadline exceeded, cancelling batch");
                let cancelled = self
                    .scheduler
                    .cancel_with(handle, CancelReason::DeadlineExceeded)
                    .await;

                if !cancelled {
                    if let Some(report) = self.scheduler.report(handle) {
                        info!(%batch_id, overall = ?report.overall_status(), "batch finished before cancellation");
                        return Ok(report);
                    }
                }

                let mut states = self.scheduler.snapshot(handle);
                let forced = force_deadline_cancelled(&mut states);
                info!(%batch_id, forced, "reporting truncated batch");
                Aggregator::aggregate_truncated(&states)
            }
            Err(err) => Err(err),
        }
    }
}

/// Marks every non-terminal state as cancelled by the deadline. Works on a
/// copy; the scheduler's own states are left alone.
fn force_deadline_cancelled(states: &mut [TaskState]) -> usize {
    let mut forced = 0;
    for state in states.iter_mut().filter(|state| !state.is_terminal()) {
        state.status = TaskStatus::Cancelled;
        state.error = Some(TaskError::Cancelled {
            reason: CancelReason::DeadlineExceeded,
        });
        forced += 1;
    }
    forced
}

#[derive(Debug)]
pub struct OrchestratorBuilder {
    scheduler: SchedulerBuilder,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = self.scheduler.config(config);
        self
    }

    pub fn registry(mut self, registry: ExecutorRegistry) -> Self {
        self.scheduler = self.scheduler.registry(registry);
        self
    }

    pub fn executor(mut self, capability: impl Into<String>, executor: impl Executor) -> Self {
        self.scheduler = self.scheduler.executor(capability, executor);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.scheduler = self.scheduler.clock(clock);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator::new(self.scheduler.build())
    }
}
