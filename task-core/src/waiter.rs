//! Defines the handle by which observers await a task's settlement
//!
//! The underlying task settles its completion source exactly once; every
//! waiter clone observes the identical outcome, whether it was created
//! before or after the task settled

use futures::{
    FutureExt, ready,
    future::{BoxFuture, Shared},
};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot::Receiver;

use crate::error::{TaskError, TaskResult};

/// The settlement waiter of a task
///
/// Cheaply cloneable so that any number of observers may await the outcome.
/// A waiter whose task was dropped without settling yields
/// [`TaskError::NeverSettled`]
#[derive(Clone)]
pub struct TaskWaiter<T: Clone> {
    /// The shared settlement future all waiter clones poll
    inner: Shared<BoxFuture<'static, TaskResult<T>>>,
}

impl<T: Clone + Send + Sync + 'static> TaskWaiter<T> {
    /// Create a waiter over the receiving half of a task's completion source
    pub(crate) fn new(recv: Receiver<TaskResult<T>>) -> Self {
        let fut = async move {
            match recv.await {
                Ok(result) => result,
                Err(_) => Err(TaskError::NeverSettled),
            }
        }
        .boxed();

        Self { inner: fut.shared() }
    }
}

impl<T: Clone> Future for TaskWaiter<T> {
    type Output = TaskResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = ready!(self.inner.poll_unpin(cx));
        Poll::Ready(result)
    }
}

impl<T: Clone> fmt::Debug for TaskWaiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWaiter").finish_non_exhaustive()
    }
}
