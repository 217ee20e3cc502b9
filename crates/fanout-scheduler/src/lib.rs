//! Batch scheduling: admits batches, dispatches ready tasks to workers up to
//! a concurrency limit, applies the retry policy and publishes progress.

mod backoff;
mod batch;
mod batch_loop;
mod config;
mod events;
mod messages;
mod ready;
mod scheduler;

pub use backoff::{Backoff, MAX_DELAY};
pub use batch::{BatchHandle, BatchStatus};
pub use config::{BACKOFF_BASE_ENV, BACKOFF_CEILING_ENV, SchedulerConfig, SchedulerConfigBuilder};
pub use events::{TaskEvent, TaskEventKind};
pub use scheduler::{Scheduler, SchedulerBuilder};
