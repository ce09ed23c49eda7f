//! Typed value-carrying tasks layered over [`Deferred`].
//!
//! A [`ValueTask`] pairs an untyped deferred cell with a shared result
//! slot. The slot is read, not consumed, so a chain and repeated waits all
//! observe the value; that is why the read paths ask for `T: Clone`.

use super::deferred::Deferred;
use crate::error::TaskError;
use crate::runtime::Runtime;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A deferred task that resolves to a value of type `T`.
pub struct ValueTask<T> {
    task: Deferred,
    slot: Arc<Mutex<Option<T>>>,
}

impl Runtime {
    /// Run `f` on the pool; the returned task resolves to `f`'s value.
    pub fn spawn_value<T, F>(&self, f: F) -> ValueTask<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(None));
        let out = slot.clone();
        let task = self.spawn(move || {
            let value = f()?;
            *out.lock() = Some(value);
            Ok(())
        });

        ValueTask { task, slot }
    }

    /// An already-resolved value task.
    pub fn value<T: Send + 'static>(&self, value: T) -> ValueTask<T> {
        let task = self.pending();
        task.complete_success();
        ValueTask {
            task,
            slot: Arc::new(Mutex::new(Some(value))),
        }
    }

    /// An already-failed value task.
    pub fn value_err<T: Send + 'static>(&self, error: TaskError) -> ValueTask<T> {
        let task = self.pending();
        task.complete_failure(error);
        ValueTask {
            task,
            slot: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T: Send + 'static> ValueTask<T> {
    /// The underlying untyped cell, for mixing with [`Deferred`]
    /// combinators such as `join_all`.
    pub fn task(&self) -> &Deferred {
        &self.task
    }

    pub fn is_complete(&self) -> bool {
        self.task.is_complete()
    }

    /// Block until resolved; returns the value or the stored failure.
    pub fn wait(&self) -> Result<T, TaskError>
    where
        T: Clone,
    {
        self.task.wait()?;
        let value = self.slot.lock().clone();
        Ok(value.expect("completed value task is missing its result"))
    }

    /// Chain a typed continuation. A failed source forwards its failure
    /// past `f`; otherwise `f` receives the resolved value on a worker.
    pub fn continue_with<U, F>(&self, f: F) -> ValueTask<U>
    where
        T: Clone,
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, TaskError> + Send + 'static,
    {
        let next_slot: Arc<Mutex<Option<U>>> = Arc::new(Mutex::new(None));
        let next = Deferred::pending_in(self.task.pool().clone());

        let source = self.task.clone();
        let source_slot = self.slot.clone();
        let out = next_slot.clone();
        let target = next.clone();

        self.task.register(Box::new(move || {
            match source
                .outcome()
                .expect("task dispatched its continuation before completing")
            {
                Err(err) => target.complete_failure(err),
                Ok(()) => {
                    let value = source_slot
                        .lock()
                        .clone()
                        .expect("completed value task is missing its result");
                    match catch_unwind(AssertUnwindSafe(|| f(value))) {
                        Ok(Ok(next_value)) => {
                            *out.lock() = Some(next_value);
                            target.complete_success();
                        }
                        Ok(Err(err)) => target.complete_failure(err),
                        Err(payload) => target.complete_failure(TaskError::panicked(payload)),
                    }
                }
            }
        }));

        ValueTask {
            task: next,
            slot: next_slot,
        }
    }
}

impl<T> Clone for ValueTask<T> {
    fn clone(&self) -> Self {
        Self {
            task: self.task.clone(),
            slot: self.slot.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Future for ValueTask<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(Ok(())) => {
                let value = self.slot.lock().clone();
                Poll::Ready(Ok(
                    value.expect("completed value task is missing its result")
                ))
            }
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for ValueTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueTask").field("task", &self.task).finish()
    }
}
