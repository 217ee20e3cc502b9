//! Task execution: the [`Executor`] capability, the registry that maps
//! capability names to executors, and the [`Worker`] that runs a single
//! attempt under a timeout.

pub mod executor;
pub mod registry;
pub mod worker;

pub use executor::{ExecutionError, Executor, FnExecutor, from_fn};
pub use registry::ExecutorRegistry;
pub use worker::{Attempt, Outcome, Straggler, Worker};
