use std::collections::HashSet;
use std::sync::Arc;

use fanout_core::{
    Batch, CancelReason, Clock, Error, InvalidBatch, Report, Result, TaskState, TokioClock,
};
use fanout_worker::{Executor, ExecutorRegistry, Worker};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{
    BatchHandle, BatchStatus, SchedulerConfig, TaskEvent,
    batch::BatchSnapshot,
    batch_loop::{BatchLoop, BatchLoopParts, Entry},
    messages::BatchCommand,
};

/// Runs batches of tasks against a fixed set of executors.
///
/// Every submitted batch gets its own scheduling loop, so batches never share
/// concurrency accounting. Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    registry: ExecutorRegistry,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self::builder().registry(registry).build()
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validates `batch` and starts scheduling it.
    ///
    /// Rejects duplicate task ids, a zero concurrency limit and tasks whose
    /// capability has no executor; a rejected batch never starts.
    pub fn submit(&self, batch: impl Into<Batch>, concurrency_limit: usize) -> Result<BatchHandle> {
        self.submit_observed(batch, concurrency_limit)
            .map(|(handle, _)| handle)
    }

    /// Like [`Scheduler::submit`], also returning a stream of every task
    /// transition from the first dispatch on.
    pub fn submit_observed(
        &self,
        batch: impl Into<Batch>,
        concurrency_limit: usize,
    ) -> Result<(BatchHandle, broadcast::Receiver<TaskEvent>)> {
        let batch = batch.into();
        let entries = self.admit(&batch, concurrency_limit)?;

        let states: Vec<TaskState> = entries.iter().map(|entry| entry.state.clone()).collect();
        let (snapshot_tx, snapshot_rx) =
            watch::channel(BatchSnapshot::new(batch.id.clone(), states, false));
        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = broadcast::channel(self.config.event_capacity);

        let batch_loop = BatchLoop::new(BatchLoopParts {
            batch_id: batch.id.clone(),
            limit: concurrency_limit,
            backoff: self.config.backoff,
            clock: Arc::clone(&self.clock),
            entries,
            outcome_capacity: self.config.outcome_capacity,
            commands: command_rx,
            snapshots: snapshot_tx,
            events: event_tx.clone(),
        });
        tokio::spawn(batch_loop.run());

        info!(batch_id = %batch.id, tasks = batch.len(), concurrency_limit, "batch submitted");

        let handle = BatchHandle {
            id: batch.id,
            snapshots: snapshot_rx,
            commands: command_tx,
            events: event_tx,
        };
        Ok((handle, event_rx))
    }

    fn admit(&self, batch: &Batch, concurrency_limit: usize) -> Result<Vec<Entry>> {
        if concurrency_limit < 1 {
            return Err(InvalidBatch::ConcurrencyLimit(concurrency_limit).into());
        }

        let mut seen = HashSet::with_capacity(batch.len());
        for spec in &batch.tasks {
            if !seen.insert(&spec.id) {
                return Err(InvalidBatch::DuplicateTaskId(spec.id.clone()).into());
            }
        }

        batch
            .tasks
            .iter()
            .map(|spec| -> Result<Entry> {
                let executor = self.registry.resolve(spec)?;
                Ok(Entry {
                    state: TaskState::pending(spec),
                    spec: Arc::new(spec.clone()),
                    worker: Worker::new(executor),
                })
            })
            .collect()
    }

    /// Current counts of `handle`'s batch. Never blocks.
    pub fn poll(&self, handle: &BatchHandle) -> BatchStatus {
        handle.snapshots.borrow().status.clone()
    }

    /// Transitions of `handle`'s batch from now on. Use
    /// [`Scheduler::submit_observed`] to see them from the first dispatch.
    pub fn subscribe(&self, handle: &BatchHandle) -> broadcast::Receiver<TaskEvent> {
        handle.events.subscribe()
    }

    /// The report, if the batch has finished. Never blocks.
    pub fn report(&self, handle: &BatchHandle) -> Option<Report> {
        handle.snapshots.borrow().report.as_deref().cloned()
    }

    /// Live per-task states in submission order.
    pub fn snapshot(&self, handle: &BatchHandle) -> Vec<TaskState> {
        handle.snapshots.borrow().tasks.clone()
    }

    /// Waits for the batch's report until `deadline`.
    ///
    /// On [`Error::DeadlineExceeded`] the batch keeps running.
    pub async fn await_report(&self, handle: &BatchHandle, deadline: Instant) -> Result<Report> {
        let mut snapshots = handle.snapshots.clone();
        let waited =
            tokio::time::timeout_at(deadline, snapshots.wait_for(|s| s.report.is_some())).await;

        match waited {
            Ok(Ok(snapshot)) => snapshot
                .report
                .as_deref()
                .cloned()
                .ok_or_else(|| stopped(handle)),
            Ok(Err(_closed)) => handle
                .snapshots
                .borrow()
                .report
                .as_deref()
                .cloned()
                .ok_or_else(|| stopped(handle)),
            Err(_elapsed) => {
                debug!(batch_id = %handle.id, "deadline exceeded waiting for report");
                Err(Error::DeadlineExceeded {
                    batch_id: handle.id.clone(),
                })
            }
        }
    }

    /// Requests cancellation of every non-terminal task.
    ///
    /// Returns `false` if the batch had already finished.
    pub async fn cancel(&self, handle: &BatchHandle) -> bool {
        self.cancel_with(handle, CancelReason::Requested).await
    }

    /// Returns once pending tasks are cancelled. Running tasks become
    /// Cancelled only when their worker returns.
    ///
    /// Returns `false` if the batch finished before the request was handled.
    pub async fn cancel_with(&self, handle: &BatchHandle, reason: CancelReason) -> bool {
        let (ack, acked) = oneshot::channel();
        if handle
            .commands
            .send(BatchCommand::Cancel { reason, ack })
            .await
            .is_err()
        {
            debug!(batch_id = %handle.id, "cancel ignored: batch already finished");
            return false;
        }
        // The loop drops unhandled commands when it finishes.
        acked.await.is_ok()
    }
}

fn stopped(handle: &BatchHandle) -> Error {
    Error::SchedulerStopped {
        batch_id: handle.id.clone(),
    }
}

#[derive(Debug)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    registry: ExecutorRegistry,
    clock: Arc<dyn Clock>,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self {
            config: SchedulerConfig::default(),
            registry: ExecutorRegistry::new(),
            clock: Arc::new(TokioClock),
        }
    }
}

impl SchedulerBuilder {
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: ExecutorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn executor(mut self, capability: impl Into<String>, executor: impl Executor) -> Self {
        self.registry.register(capability, executor);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler {
            config: self.config,
            registry: self.registry,
            clock: self.clock,
        }
    }
}
