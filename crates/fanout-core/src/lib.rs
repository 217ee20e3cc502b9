//! Data model shared by the fanout scheduler, workers and orchestrator:
//! task specs and states, reports, the aggregator and the error taxonomy.

pub mod aggregate;
pub mod batch;
pub mod clock;
pub mod error;
pub mod ids;
pub mod report;
pub mod task;

pub use aggregate::Aggregator;
pub use batch::Batch;
pub use clock::{Clock, ManualClock, TokioClock};
pub use error::{Error, InvalidBatch, Result, TaskTransitionError};
pub use ids::{BatchId, TaskId};
pub use report::{OverallStatus, Report, StatusCounts};
pub use task::{
    CancelReason, DEFAULT_CAPABILITY, TaskError, TaskSpec, TaskSpecBuilder, TaskState, TaskStatus,
};
