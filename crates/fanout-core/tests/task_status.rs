use std::time::Duration;

use fanout_core::{CancelReason, TaskError, TaskSpec, TaskState, TaskStatus, TaskTransitionError};

const T0: Duration = Duration::ZERO;

#[test]
fn test_valid_transitions() {
    let s = TaskStatus::Pending;
    let s = s.mark_as_running().unwrap();
    let s = s.mark_as_succeeded().unwrap();
    assert_eq!(s, TaskStatus::Succeeded);
}

#[test]
fn test_invalid_transition() {
    let s = TaskStatus::Pending;
    assert!(s.mark_as_succeeded().is_err());
    assert!(s.mark_as_failed().is_err());
    assert!(s.mark_as_timed_out().is_err());
}

#[test]
fn test_terminal_statuses_do_not_move() {
    for s in [TaskStatus::Succeeded, TaskStatus::Cancelled] {
        assert!(s.mark_as_running().is_err());
        assert!(s.mark_as_pending().is_err());
        assert!(s.mark_as_cancelled().is_err());
    }
}

#[test]
fn test_retry_flow() {
    let spec = TaskSpec::builder(vec![]).id("b").max_retries(2).build();
    let mut t = TaskState::pending(&spec);

    t.start(T0).unwrap();
    t.fail("err".into(), Duration::from_millis(5)).unwrap();
    assert_eq!(t.attempts, 1);
    assert!(!t.is_terminal());
    assert_eq!(
        t.error,
        Some(TaskError::Execution {
            message: "err".into()
        })
    );

    t.requeue().unwrap();
    assert_eq!(t.status, TaskStatus::Pending);
    assert_eq!(t.error, None);

    t.start(Duration::from_millis(10)).unwrap();
    t.succeed(b"ok".to_vec(), Duration::from_millis(12)).unwrap();
    assert_eq!(t.attempts, 2);
    assert!(t.is_terminal());
    assert_eq!(t.result.as_deref(), Some(&b"ok"[..]));
    assert_eq!(t.started_at, Some(Duration::from_millis(10)));
    assert_eq!(t.finished_at, Some(Duration::from_millis(12)));
}

#[test]
fn test_retry_limit_exceeded() {
    let spec = TaskSpec::builder(vec![]).max_retries(1).build();
    let mut t = TaskState::pending(&spec);

    t.start(T0).unwrap();
    t.time_out(Duration::from_secs(1), T0).unwrap();
    t.requeue().unwrap();
    t.start(T0).unwrap();
    t.fail("again".into(), T0).unwrap();

    assert!(t.is_terminal());
    assert!(matches!(
        t.requeue(),
        Err(TaskTransitionError::RetriesExhausted { attempts: 2, .. })
    ));
    assert!(t.start(T0).is_err());
}

#[test]
fn test_cancel_pending_and_running() {
    let spec = TaskSpec::builder(vec![]).build();

    let mut pending = TaskState::pending(&spec);
    pending.cancel(CancelReason::Requested, T0).unwrap();
    assert!(pending.is_terminal());

    let mut running = TaskState::pending(&spec);
    running.start(T0).unwrap();
    running.cancel(CancelReason::DeadlineExceeded, T0).unwrap();
    assert_eq!(
        running.error,
        Some(TaskError::Cancelled {
            reason: CancelReason::DeadlineExceeded
        })
    );
    assert!(running.cancel(CancelReason::Requested, T0).is_err());
}

#[test]
fn test_builder_defaults() {
    let spec = TaskSpec::builder(b"payload".to_vec()).build();
    assert_eq!(spec.max_retries, 0);
    assert_eq!(spec.priority, 0);
    assert_eq!(spec.capability, fanout_core::DEFAULT_CAPABILITY);
    assert_ne!(spec.id, TaskSpec::builder(vec![]).build().id);
}
