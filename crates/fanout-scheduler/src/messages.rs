use fanout_core::CancelReason;
use fanout_worker::Outcome;
use tokio::sync::oneshot;

/// Sent by a worker when an attempt ends, and again by the straggler
/// forwarder if a timed-out execution eventually produces a result.
#[derive(Debug)]
pub(crate) struct ExecutionEvent {
    pub(crate) index: usize,
    pub(crate) attempt: u32,
    pub(crate) outcome: Outcome,
}

#[derive(Debug)]
pub(crate) enum BatchCommand {
    /// `ack` fires once every pending task is cancelled and the new state published.
    Cancel {
        reason: CancelReason,
        ack: oneshot::Sender<()>,
    },
}
