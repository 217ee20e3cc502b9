use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use fanout_core::{CancelReason, OverallStatus, TaskError, TaskSpec, TaskStatus};
use fanout_scheduler::{Scheduler, TaskEvent, TaskEventKind};
use fanout_worker::{ExecutionError, ExecutorRegistry, from_fn};
use tokio::sync::broadcast;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

const FAR: Duration = Duration::from_secs(3600);

fn task(id: &str) -> TaskSpec {
    TaskSpec::builder(vec![]).id(id).timeout(Duration::from_secs(60)).build()
}

fn drain(events: &mut broadcast::Receiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_pending_now_and_running_cooperatively() {
    let registry = ExecutorRegistry::single(from_fn(|_, cancel: CancellationToken| async move {
        cancel.cancelled().await;
        sleep(Duration::from_millis(500)).await;
        Err(ExecutionError::new("cancelled"))
    }));
    let scheduler = Scheduler::new(registry);
    let handle = scheduler
        .submit(vec![task("a"), task("b"), task("c")], 1)
        .unwrap();

    sleep(Duration::from_secs(1)).await;
    scheduler.cancel(&handle).await;

    let status = scheduler.poll(&handle);
    assert!(status.cancel_requested);
    assert_eq!(status.counts.cancelled, 2);
    assert_eq!(status.counts.running, 1);
    assert!(!status.terminal);

    let report = scheduler
        .await_report(&handle, Instant::now() + FAR)
        .await
        .unwrap();
    assert_eq!(report.overall_status(), OverallStatus::Failure);
    for state in report.tasks() {
        assert_eq!(state.status, TaskStatus::Cancelled);
        assert_eq!(
            state.error,
            Some(TaskError::Cancelled {
                reason: CancelReason::Requested
            })
        );
    }
    assert_eq!(report.task("a").unwrap().attempts, 1);
    assert_eq!(report.task("b").unwrap().attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn attempt_that_finishes_after_cancel_keeps_its_result() {
    let registry = ExecutorRegistry::single(from_fn(|p, _| async move {
        sleep(Duration::from_secs(2)).await;
        Ok(p)
    }));
    let scheduler = Scheduler::new(registry);
    let handle = scheduler.submit(vec![task("a"), task("b")], 1).unwrap();

    sleep(Duration::from_secs(1)).await;
    scheduler.cancel(&handle).await;

    let report = scheduler
        .await_report(&handle, Instant::now() + FAR)
        .await
        .unwrap();
    assert_eq!(report.task("a").unwrap().status, TaskStatus::Succeeded);
    assert_eq!(report.task("b").unwrap().status, TaskStatus::Cancelled);
    assert_eq!(report.overall_status(), OverallStatus::PartialFailure);
}

#[tokio::test(start_paused = true)]
async fn cancelled_batch_does_not_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let counted = calls.clone();
    let registry = ExecutorRegistry::single(from_fn(move |_, cancel: CancellationToken| {
        let counted = counted.clone();
        async move {
            counted.fetch_add(1, Ordering::SeqCst);
            cancel.cancelled().await;
            Err(ExecutionError::new("stopped"))
        }
    }));
    let scheduler = Scheduler::new(registry);
    let spec = TaskSpec::builder(vec![]).id("r").max_retries(5).build();
    let handle = scheduler.submit(vec![spec], 1).unwrap();

    sleep(Duration::from_millis(10)).await;
    scheduler.cancel(&handle).await;
    let report = scheduler
        .await_report(&handle, Instant::now() + FAR)
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.tasks()[0].status, TaskStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn late_result_after_timeout_is_discarded() {
    let mut registry = ExecutorRegistry::new();
    registry
        .register("stubborn", from_fn(|_, _| async {
            sleep(Duration::from_secs(2)).await;
            Ok(b"too late".to_vec())
        }))
        .register("slow", from_fn(|p, _| async move {
            sleep(Duration::from_secs(5)).await;
            Ok(p)
        }));
    let scheduler = Scheduler::new(registry);
    let batch = vec![
        TaskSpec::builder(vec![])
            .id("late")
            .capability("stubborn")
            .timeout(Duration::from_secs(1))
            .build(),
        TaskSpec::builder(vec![]).id("keepalive").capability("slow").build(),
    ];

    let (handle, mut events) = scheduler.submit_observed(batch, 2).unwrap();
    let report = scheduler
        .await_report(&handle, Instant::now() + FAR)
        .await
        .unwrap();

    let late = report.task("late").unwrap();
    assert_eq!(late.status, TaskStatus::TimedOut);
    assert_eq!(late.result, None);
    assert_eq!(
        late.error,
        Some(TaskError::TimedOut {
            after: Duration::from_secs(1)
        })
    );

    let discarded: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| e.kind == TaskEventKind::LateResultDiscarded)
        .collect();
    assert_eq!(discarded.len(), 1);
    assert_eq!(discarded[0].task_id.as_str(), "late");
    assert_eq!(report.overall_status(), OverallStatus::PartialFailure);
}

#[tokio::test(start_paused = true)]
async fn stale_attempt_cannot_overwrite_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let counted = calls.clone();
    let mut registry = ExecutorRegistry::new();
    registry
        .register("twice", from_fn(move |_, _| {
            let counted = counted.clone();
            async move {
                if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                    sleep(Duration::from_secs(3)).await;
                    Ok(b"stale".to_vec())
                } else {
                    Ok(b"fresh".to_vec())
                }
            }
        }))
        .register("slow", from_fn(|p, _| async move {
            sleep(Duration::from_secs(5)).await;
            Ok(p)
        }));
    let scheduler = Scheduler::builder()
        .registry(registry)
        .config(
            fanout_scheduler::SchedulerConfig::builder()
                .backoff_base(Duration::ZERO)
                .build(),
        )
        .build();
    let batch = vec![
        TaskSpec::builder(vec![])
            .id("t")
            .capability("twice")
            .timeout(Duration::from_secs(1))
            .max_retries(1)
            .build(),
        TaskSpec::builder(vec![]).id("keepalive").capability("slow").build(),
    ];

    let (handle, mut events) = scheduler.submit_observed(batch, 2).unwrap();
    let report = scheduler
        .await_report(&handle, Instant::now() + FAR)
        .await
        .unwrap();

    let t = report.task("t").unwrap();
    assert_eq!(t.status, TaskStatus::Succeeded);
    assert_eq!(t.attempts, 2);
    assert_eq!(t.result.as_deref(), Some(&b"fresh"[..]));
    assert!(
        drain(&mut events)
            .iter()
            .any(|e| e.kind == TaskEventKind::LateResultDiscarded)
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_after_completion_is_a_no_op() {
    let scheduler = Scheduler::new(ExecutorRegistry::single(from_fn(|p, _| async move {
        Ok(p)
    })));
    let handle = scheduler.submit(vec![task("a")], 1).unwrap();
    let report = scheduler
        .await_report(&handle, Instant::now() + FAR)
        .await
        .unwrap();

    assert!(!scheduler.cancel(&handle).await);

    assert_eq!(report.overall_status(), OverallStatus::Success);
    assert_eq!(scheduler.poll(&handle).counts.succeeded, 1);
    assert!(!scheduler.poll(&handle).cancel_requested);
    assert_eq!(scheduler.report(&handle), Some(report));
}

#[tokio::test(start_paused = true)]
async fn cancel_acknowledged_while_running_returns_true() {
    let scheduler = Scheduler::new(ExecutorRegistry::single(from_fn(|p, _| async move {
        sleep(Duration::from_secs(1)).await;
        Ok(p)
    })));
    let handle = scheduler.submit(vec![task("a"), task("b")], 1).unwrap();
    sleep(Duration::from_millis(10)).await;

    assert!(scheduler.report(&handle).is_none());
    assert!(scheduler.cancel(&handle).await);
}

#[tokio::test(start_paused = true)]
async fn result_arriving_after_cancel_and_timeout_is_discarded() {
    let mut registry = ExecutorRegistry::new();
    registry
        .register("deaf", from_fn(|_, _| async {
            // Never looks at the cancellation token.
            sleep(Duration::from_secs(2)).await;
            Ok(b"ignored".to_vec())
        }))
        .register("slow", from_fn(|p, _| async move {
            sleep(Duration::from_secs(5)).await;
            Ok(p)
        }));
    let scheduler = Scheduler::new(registry);
    let batch = vec![
        TaskSpec::builder(vec![])
            .id("late")
            .capability("deaf")
            .timeout(Duration::from_secs(1))
            .build(),
        TaskSpec::builder(vec![]).id("keepalive").capability("slow").build(),
    ];

    let (handle, mut events) = scheduler.submit_observed(batch, 2).unwrap();
    sleep(Duration::from_millis(500)).await;
    assert!(scheduler.cancel(&handle).await);

    let report = scheduler
        .await_report(&handle, Instant::now() + FAR)
        .await
        .unwrap();

    let late = report.task("late").unwrap();
    assert_eq!(late.status, TaskStatus::Cancelled);
    assert_eq!(late.attempts, 1);
    assert_eq!(late.result, None);
    assert_eq!(
        late.error,
        Some(TaskError::Cancelled {
            reason: CancelReason::Requested
        })
    );
    assert_eq!(report.task("keepalive").unwrap().status, TaskStatus::Succeeded);

    let seen = drain(&mut events);
    let late_kinds: Vec<_> = seen
        .iter()
        .filter(|e| e.task_id.as_str() == "late")
        .map(|e| e.kind.clone())
        .collect();
    assert_eq!(
        late_kinds,
        [
            TaskEventKind::Dispatched,
            TaskEventKind::Cancelled {
                reason: CancelReason::Requested
            },
            TaskEventKind::LateResultDiscarded,
        ]
    );
}
