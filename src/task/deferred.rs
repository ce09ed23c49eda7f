//! The single-assignment deferred task cell.

use crate::context::AmbientContext;
use crate::error::TaskError;
use crate::pool::WorkerPool;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// A single-assignment future: a computation that will eventually complete
/// with success, or fail with a [`TaskError`].
///
/// A task leaves its pending state exactly once. At most one continuation
/// may be registered against it, and the continuation always executes on a
/// pool worker: never inline on the thread that completed the task, and
/// never inline on the thread that registered it, even when registration
/// happens after completion.
///
/// Clones share the same cell; the task also implements [`Future`], so a
/// chain can be awaited from any executor instead of blocked on with
/// [`wait`](Deferred::wait).
#[derive(Clone)]
pub struct Deferred {
    inner: Arc<Inner>,
}

struct Inner {
    pool: Arc<WorkerPool>,
    state: Mutex<State>,
    // Signalled once on the pending -> terminal transition; `wait` blocks here.
    done: Condvar,
}

enum State {
    Pending {
        continuation: Option<Continuation>,
        waker: Option<Waker>,
    },
    Complete(Option<TaskError>),
}

struct Continuation {
    run: Box<dyn FnOnce() + Send + 'static>,
    context: AmbientContext,
}

impl Deferred {
    pub(crate) fn pending_in(pool: Arc<WorkerPool>) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                state: Mutex::new(State::Pending {
                    continuation: None,
                    waker: None,
                }),
                done: Condvar::new(),
            }),
        }
    }

    pub(crate) fn pool(&self) -> &Arc<WorkerPool> {
        &self.inner.pool
    }

    /// Whether the task has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        matches!(&*self.inner.state.lock(), State::Complete(_))
    }

    /// The terminal result, or `None` while still pending.
    pub fn outcome(&self) -> Option<Result<(), TaskError>> {
        match &*self.inner.state.lock() {
            State::Pending { .. } => None,
            State::Complete(None) => Some(Ok(())),
            State::Complete(Some(err)) => Some(Err(err.clone())),
        }
    }

    /// Transition the task to success.
    ///
    /// # Panics
    ///
    /// Panics if the task is already terminal: completing a task twice is a
    /// protocol violation, never silently ignored.
    pub fn complete_success(&self) {
        self.complete(None);
    }

    /// Transition the task to failure. Same single-use contract as
    /// [`complete_success`](Deferred::complete_success).
    pub fn complete_failure(&self, error: TaskError) {
        self.complete(Some(error));
    }

    fn complete(&self, outcome: Option<TaskError>) {
        let mut state = self.inner.state.lock();

        let (continuation, waker) = match &mut *state {
            State::Complete(_) => {
                panic!("deferred task completed twice; complete_success/complete_failure are single-use")
            }
            State::Pending {
                continuation,
                waker,
            } => (continuation.take(), waker.take()),
        };

        *state = State::Complete(outcome);

        // Dispatch through the pool, never inline on the completing thread.
        if let Some(continuation) = continuation {
            self.inner
                .pool
                .submit_captured(continuation.run, continuation.context);
        }
        self.inner.done.notify_all();
        drop(state);

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Store `run` to be dispatched when the task completes, together with
    /// the registering thread's ambient context. Already-terminal tasks
    /// dispatch immediately, still through the pool, not inline.
    pub(crate) fn register(&self, run: Box<dyn FnOnce() + Send + 'static>) {
        let context = AmbientContext::capture();

        let immediate = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Complete(_) => Some((run, context)),
                State::Pending { continuation, .. } => {
                    if continuation.is_some() {
                        panic!("a continuation is already registered on this deferred task");
                    }
                    *continuation = Some(Continuation { run, context });
                    None
                }
            }
        };

        if let Some((run, context)) = immediate {
            self.inner.pool.submit_captured(run, context);
        }
    }

    /// Register a continuation; returns a new task that completes with
    /// `f`'s outcome (an `Err` return or a panic becomes a failure).
    ///
    /// This never blocks and never runs `f` inline.
    ///
    /// # Panics
    ///
    /// Panics if a continuation is already registered on this task.
    pub fn continue_with<F>(&self, f: F) -> Deferred
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        let next = Deferred::pending_in(self.inner.pool.clone());
        let target = next.clone();
        self.register(Box::new(move || settle(&target, f)));
        next
    }

    /// Like [`continue_with`](Deferred::continue_with), but for callbacks
    /// that start another deferred task: the inner task's eventual outcome
    /// (success or failure, verbatim) is forwarded onto the returned task,
    /// flattening the chain.
    pub fn continue_with_task<F>(&self, f: F) -> Deferred
    where
        F: FnOnce() -> Result<Deferred, TaskError> + Send + 'static,
    {
        let next = Deferred::pending_in(self.inner.pool.clone());
        let target = next.clone();
        self.register(Box::new(move || {
            match catch_unwind(AssertUnwindSafe(f)) {
                Ok(Ok(inner)) => {
                    let source = inner.clone();
                    inner.register(Box::new(move || {
                        match source
                            .outcome()
                            .expect("task dispatched its continuation before completing")
                        {
                            Ok(()) => target.complete_success(),
                            Err(err) => target.complete_failure(err),
                        }
                    }));
                }
                Ok(Err(err)) => target.complete_failure(err),
                Err(payload) => target.complete_failure(TaskError::panicked(payload)),
            }
        }));
        next
    }

    /// Block the calling thread until the task is terminal.
    ///
    /// Returns `Ok(())` for success, or a clone of the stored failure.
    /// Repeated calls observe the same failure, with the original error
    /// still reachable through `source()`.
    pub fn wait(&self) -> Result<(), TaskError> {
        let mut state = self.inner.state.lock();
        loop {
            match &*state {
                State::Complete(None) => return Ok(()),
                State::Complete(Some(err)) => return Err(err.clone()),
                State::Pending { .. } => {}
            }
            self.inner.done.wait(&mut state);
        }
    }
}

/// Run `f`, routing its outcome (including a panic) into `target`.
pub(crate) fn settle<F>(target: &Deferred, f: F)
where
    F: FnOnce() -> Result<(), TaskError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => target.complete_success(),
        Ok(Err(err)) => target.complete_failure(err),
        Err(payload) => target.complete_failure(TaskError::panicked(payload)),
    }
}

impl Future for Deferred {
    type Output = Result<(), TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Complete(None) => Poll::Ready(Ok(())),
            State::Complete(Some(err)) => Poll::Ready(Err(err.clone())),
            State::Pending { waker, .. } => {
                // last poller wins; one waker slot is enough for a cell
                // that is awaited from one place
                *waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.lock() {
            State::Pending { .. } => "pending",
            State::Complete(None) => "success",
            State::Complete(Some(_)) => "failure",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}
