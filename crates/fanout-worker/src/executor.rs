//! The execution backend a task is run with.
//!
//! A retried task calls `execute` again with the same payload, so executors
//! must tolerate being invoked more than once for the same task.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ExecutionError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ExecutionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Runs one attempt of a task.
///
/// `cancel` fires when the batch is cancelled or the attempt times out.
/// Honouring it is optional.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(
        &self,
        payload: Vec<u8>,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, ExecutionError>;
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Arc<E> {
    async fn execute(
        &self,
        payload: Vec<u8>,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, ExecutionError> {
        (**self).execute(payload, cancel).await
    }
}

/// Executor backed by an async closure. See [`from_fn`].
#[derive(Clone)]
pub struct FnExecutor<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnExecutor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}

/// Wraps `f(payload, cancel)` as an [`Executor`].
pub fn from_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(Vec<u8>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>, ExecutionError>> + Send + 'static,
{
    FnExecutor { f }
}

#[async_trait]
impl<F, Fut> Executor for FnExecutor<F>
where
    F: Fn(Vec<u8>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>, ExecutionError>> + Send + 'static,
{
    async fn execute(
        &self,
        payload: Vec<u8>,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, ExecutionError> {
        (self.f)(payload, cancel).await
    }
}
