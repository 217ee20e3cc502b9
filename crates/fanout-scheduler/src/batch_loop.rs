use std::sync::Arc;
use std::time::Duration;

use fanout_core::{
    Aggregator, BatchId, CancelReason, Clock, TaskSpec, TaskState, TaskStatus,
};
use fanout_worker::{Attempt, Outcome, Worker};
use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, warn};

use crate::{
    Backoff, TaskEvent, TaskEventKind,
    batch::BatchSnapshot,
    messages::{BatchCommand, ExecutionEvent},
    ready::ReadyQueue,
};

#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) spec: Arc<TaskSpec>,
    pub(crate) state: TaskState,
    pub(crate) worker: Worker,
}

/// Owns every task state of one batch. Workers never touch the states;
/// they report back over `exec_rx` and this loop applies the transition.
#[derive(Debug)]
pub(crate) struct BatchLoop {
    batch_id: BatchId,
    limit: usize,
    backoff: Backoff,
    clock: Arc<dyn Clock>,
    epoch: Instant,

    entries: Vec<Entry>,
    ready: ReadyQueue,
    delayed: DelayQueue<usize>,
    running: usize,

    cancel: CancellationToken,
    cancel_reason: Option<CancelReason>,
    commands_open: bool,

    exec_tx: mpsc::Sender<ExecutionEvent>,
    exec_rx: mpsc::Receiver<ExecutionEvent>,
    commands: mpsc::Receiver<BatchCommand>,
    snapshots: watch::Sender<BatchSnapshot>,
    events: broadcast::Sender<TaskEvent>,
}

pub(crate) struct BatchLoopParts {
    pub(crate) batch_id: BatchId,
    pub(crate) limit: usize,
    pub(crate) backoff: Backoff,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) entries: Vec<Entry>,
    pub(crate) outcome_capacity: usize,
    pub(crate) commands: mpsc::Receiver<BatchCommand>,
    pub(crate) snapshots: watch::Sender<BatchSnapshot>,
    pub(crate) events: broadcast::Sender<TaskEvent>,
}

impl BatchLoop {
    pub(crate) fn new(parts: BatchLoopParts) -> Self {
        let (exec_tx, exec_rx) = mpsc::channel(parts.outcome_capacity);
        let epoch = parts.clock.now();

        let mut ready = ReadyQueue::default();
        for (index, entry) in parts.entries.iter().enumerate() {
            ready.push(index, entry.spec.priority);
        }

        Self {
            batch_id: parts.batch_id,
            limit: parts.limit,
            backoff: parts.backoff,
            clock: parts.clock,
            epoch,
            entries: parts.entries,
            ready,
            delayed: DelayQueue::new(),
            running: 0,
            cancel: CancellationToken::new(),
            cancel_reason: None,
            commands_open: true,
            exec_tx,
            exec_rx,
            commands: parts.commands,
            snapshots: parts.snapshots,
            events: parts.events,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            batch_id = %self.batch_id,
            tasks = self.entries.len(),
            limit = self.limit,
            "batch started"
        );

        self.dispatch();
        self.publish();

        while !self.is_terminal() {
            tokio::select! {
                Some(event) = self.exec_rx.recv() => {
                    self.handle_execution(event);
                }

                Some(expired) = self.delayed.next(), if !self.delayed.is_empty() => {
                    self.make_ready(expired.into_inner());
                }

                command = self.commands.recv(), if self.commands_open => {
                    match command {
                        Some(BatchCommand::Cancel { reason, ack }) => {
                            self.cancel_all(reason);
                            self.publish();
                            let _ = ack.send(());
                        }
                        None => self.commands_open = false,
                    }
                }
            }

            self.dispatch();
            self.publish();
        }

        self.finish();
    }

    fn is_terminal(&self) -> bool {
        self.entries.iter().all(|entry| entry.state.is_terminal())
    }

    fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.epoch)
    }

    fn emit(&self, index: usize, kind: TaskEventKind) {
        let state = &self.entries[index].state;
        // No subscribers is fine.
        let _ = self.events.send(TaskEvent {
            task_id: state.id.clone(),
            attempt: state.attempts,
            kind,
            running: self.running,
        });
    }

    /// Fills free slots from the ready queue.
    fn dispatch(&mut self) {
        while self.running < self.limit && self.cancel_reason.is_none() {
            let Some(index) = self.ready.pop() else {
                break;
            };

            let at = self.elapsed();
            let entry = &mut self.entries[index];
            if let Err(err) = entry.state.start(at) {
                error!(batch_id = %self.batch_id, task_id = %entry.spec.id, error = %err, "cannot start task");
                continue;
            }

            let attempt = entry.state.attempts;
            let spec = Arc::clone(&entry.spec);
            let worker = entry.worker.clone();
            let token = self.cancel.child_token();
            let tx = self.exec_tx.clone();
            self.running += 1;

            debug!(
                batch_id = %self.batch_id,
                task_id = %spec.id,
                attempt,
                running = self.running,
                "task dispatched"
            );

            tokio::spawn(async move {
                let Attempt { outcome, straggler } = worker.run(&spec, token).await;
                // The loop is gone once the batch is terminal.
                let _ = tx.send(ExecutionEvent { index, attempt, outcome }).await;

                if let Some(straggler) = straggler {
                    let outcome = straggler.join().await;
                    let _ = tx.send(ExecutionEvent { index, attempt, outcome }).await;
                }
            });

            self.emit(index, TaskEventKind::Dispatched);
        }
    }

    fn handle_execution(&mut self, event: ExecutionEvent) {
        let ExecutionEvent { index, attempt, outcome } = event;
        let state = &self.entries[index].state;

        if state.status != TaskStatus::Running || state.attempts != attempt {
            debug!(
                batch_id = %self.batch_id,
                task_id = %state.id,
                attempt,
                status = %state.status,
                "discarding late result"
            );
            self.emit(index, TaskEventKind::LateResultDiscarded);
            return;
        }

        self.running -= 1;
        let at = self.elapsed();
        let timeout = self.entries[index].spec.timeout;

        if let Some(reason) = self.cancel_reason {
            self.settle_cancelled_attempt(index, outcome, reason, at);
            return;
        }

        let applied = {
            let state = &mut self.entries[index].state;
            match &outcome {
                Outcome::Success(result) => state.succeed(result.clone(), at),
                Outcome::Failure(err) => state.fail(err.message.clone(), at),
                Outcome::TimedOut => state.time_out(timeout, at),
            }
        };
        if let Err(err) = applied {
            error!(batch_id = %self.batch_id, error = %err, "rejected task transition");
            return;
        }

        match outcome {
            Outcome::Success(_) => {
                info!(
                    batch_id = %self.batch_id,
                    task_id = %self.entries[index].state.id,
                    attempt,
                    "task succeeded"
                );
                self.emit(index, TaskEventKind::Succeeded);
            }
            Outcome::Failure(err) => {
                self.emit(index, TaskEventKind::Failed { message: err.message });
                self.retry_or_settle(index);
            }
            Outcome::TimedOut => {
                self.emit(index, TaskEventKind::TimedOut);
                self.retry_or_settle(index);
            }
        }
    }

    /// After cancellation a finished attempt keeps its result; anything else
    /// ends the task as Cancelled without retrying.
    fn settle_cancelled_attempt(
        &mut self,
        index: usize,
        outcome: Outcome,
        reason: CancelReason,
        at: Duration,
    ) {
        let state = &mut self.entries[index].state;
        let applied = match outcome {
            Outcome::Success(result) => state.succeed(result, at).map(|()| TaskEventKind::Succeeded),
            Outcome::Failure(_) | Outcome::TimedOut => state
                .cancel(reason, at)
                .map(|()| TaskEventKind::Cancelled { reason }),
        };

        match applied {
            Ok(kind) => {
                debug!(batch_id = %self.batch_id, task_id = %state.id, ?kind, "cancelled batch: attempt settled");
                self.emit(index, kind);
            }
            Err(err) => error!(batch_id = %self.batch_id, error = %err, "rejected task transition"),
        }
    }

    fn retry_or_settle(&mut self, index: usize) {
        let entry = &mut self.entries[index];

        if !entry.state.can_retry() {
            error!(
                batch_id = %self.batch_id,
                task_id = %entry.state.id,
                attempts = entry.state.attempts,
                status = %entry.state.status,
                "task permanently failed"
            );
            return;
        }

        if let Err(err) = entry.state.requeue() {
            error!(batch_id = %self.batch_id, error = %err, "cannot requeue task");
            return;
        }

        let delay = self.backoff.delay_for(entry.state.attempts);
        warn!(
            batch_id = %self.batch_id,
            task_id = %entry.state.id,
            attempts = entry.state.attempts,
            delay_ms = delay.as_millis(),
            "scheduling retry"
        );

        if delay.is_zero() {
            self.ready.push(index, entry.spec.priority);
        } else {
            self.delayed.insert(index, delay);
        }
        self.emit(index, TaskEventKind::RetryScheduled { delay });
    }

    fn make_ready(&mut self, index: usize) {
        let entry = &self.entries[index];
        if entry.state.status == TaskStatus::Pending {
            self.ready.push(index, entry.spec.priority);
        }
    }

    /// Pending tasks are cancelled now; running ones once their worker returns.
    fn cancel_all(&mut self, reason: CancelReason) {
        if self.cancel_reason.is_some() {
            debug!(batch_id = %self.batch_id, "batch already cancelling");
            return;
        }

        info!(batch_id = %self.batch_id, ?reason, running = self.running, "cancelling batch");
        self.cancel_reason = Some(reason);
        self.cancel.cancel();
        self.ready.clear();
        self.delayed.clear();

        let at = self.elapsed();
        for index in 0..self.entries.len() {
            if self.entries[index].state.status != TaskStatus::Pending {
                continue;
            }
            match self.entries[index].state.cancel(reason, at) {
                Ok(()) => self.emit(index, TaskEventKind::Cancelled { reason }),
                Err(err) => error!(batch_id = %self.batch_id, error = %err, "cannot cancel task"),
            }
        }
    }

    fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot::new(
            self.batch_id.clone(),
            self.entries.iter().map(|entry| entry.state.clone()).collect(),
            self.cancel_reason.is_some(),
        )
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn finish(self) {
        let mut snapshot = self.snapshot();

        match Aggregator::aggregate(&snapshot.tasks) {
            Ok(report) => {
                info!(
                    batch_id = %self.batch_id,
                    overall = ?report.overall_status(),
                    succeeded = report.counts().succeeded,
                    failed = report.counts().failed,
                    timed_out = report.counts().timed_out,
                    cancelled = report.counts().cancelled,
                    "batch finished"
                );
                snapshot.report = Some(Arc::new(report));
            }
            Err(err) => error!(batch_id = %self.batch_id, error = %err, "cannot build report"),
        }

        self.snapshots.send_replace(snapshot);
    }
}
