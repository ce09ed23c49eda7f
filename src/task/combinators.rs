//! Combinators that build new deferred tasks out of existing ones.

use super::deferred::Deferred;
use crate::error::TaskError;
use crate::runtime::Runtime;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

impl Runtime {
    /// A task that completes with success once every input task is
    /// terminal, immediately for an empty input.
    ///
    /// A failing input still counts toward completion, and its failure is
    /// NOT surfaced on the joined task; observe the inputs directly when
    /// their outcomes matter. Known weak point of this combinator, kept
    /// pending a product-level decision on aggregation.
    pub fn join_all<I>(&self, tasks: I) -> Deferred
    where
        I: IntoIterator<Item = Deferred>,
    {
        let tasks: Vec<Deferred> = tasks.into_iter().collect();
        let joined = self.pending();

        if tasks.is_empty() {
            joined.complete_success();
            return joined;
        }

        let remaining = Arc::new(AtomicUsize::new(tasks.len()));
        for task in tasks {
            let remaining = remaining.clone();
            let joined = joined.clone();
            task.register(Box::new(move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    joined.complete_success();
                }
            }));
        }

        joined
    }

    /// Run a sequence of tasks strictly one after another, never
    /// concurrently.
    ///
    /// The sequence is pulled lazily: the next task is taken only after
    /// the previous one succeeded. A sub-task failure, or a panic while
    /// pulling from the sequence, completes the result with that failure
    /// and halts iteration; exhausting the sequence completes it with
    /// success. The first pull already happens on a worker, so the
    /// constructor returns without running any sequence code.
    pub fn iterate<I>(&self, tasks: I) -> Deferred
    where
        I: IntoIterator<Item = Deferred>,
        I::IntoIter: Send + 'static,
    {
        let result = self.pending();
        let iter: Box<dyn Iterator<Item = Deferred> + Send> = Box::new(tasks.into_iter());

        let target = result.clone();
        self.pool().submit(move || advance(iter, target));

        result
    }
}

fn advance(mut iter: Box<dyn Iterator<Item = Deferred> + Send>, result: Deferred) {
    let next = match catch_unwind(AssertUnwindSafe(|| iter.next())) {
        Ok(next) => next,
        Err(payload) => {
            result.complete_failure(TaskError::panicked(payload));
            return;
        }
    };

    match next {
        None => result.complete_success(),
        Some(task) => {
            let source = task.clone();
            task.register(Box::new(move || {
                match source
                    .outcome()
                    .expect("task dispatched its continuation before completing")
                {
                    Ok(()) => advance(iter, result),
                    Err(err) => result.complete_failure(err),
                }
            }));
        }
    }
}
