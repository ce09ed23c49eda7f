//! The fixed worker pool and its blocking work queue.
//!
//! One unbounded MPMC channel feeds a fixed set of worker threads created
//! at pool construction. Items dequeue in enqueue order, but with several
//! workers draining concurrently there is no total order of execution.

pub mod worker;

use crate::config::Config;
use crate::context::AmbientContext;
use crate::error::{Error, Result};
use crate::telemetry::Metrics;
use crossbeam_channel::{unbounded, Sender};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) enum Message {
    Item(WorkItem),
    Terminate,
}

pub(crate) struct WorkItem {
    pub(crate) run: Box<dyn FnOnce() + Send + 'static>,
    pub(crate) context: AmbientContext,
}

/// A fixed set of worker threads draining one blocking FIFO queue.
///
/// The pool accepts work from any thread and guarantees each item is
/// eventually executed by exactly one worker. It returns nothing to the
/// submitter and catches nothing on its behalf beyond keeping the worker
/// alive; callers that care about outcomes wrap their work in a
/// [`Deferred`](crate::task::Deferred).
pub struct WorkerPool {
    tx: Sender<Message>,
    workers: Vec<JoinHandle<()>>,
    num_threads: usize,
    metrics: Arc<Metrics>,
}

impl WorkerPool {
    pub fn new(config: &Config) -> Result<Self> {
        let num_threads = config.worker_threads();
        if num_threads == 0 {
            return Err(Error::config("need at least 1 thread"));
        }

        let (tx, rx) = unbounded::<Message>();
        let metrics = Arc::new(Metrics::new());
        let mut workers = Vec::with_capacity(num_threads);

        for id in 0..num_threads {
            let rx = rx.clone();
            let metrics = metrics.clone();
            let priority = config.thread_priority;
            let name = format!("{}-{}", config.thread_name_prefix, id);

            let mut builder = thread::Builder::new().name(name);
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let thread = builder
                .spawn(move || worker::run(id, priority, rx, metrics))
                .map_err(|e| Error::executor(format!("spawn failed: {}", e)))?;

            workers.push(thread);
        }

        Ok(Self {
            tx,
            workers,
            num_threads,
            metrics,
        })
    }

    /// Enqueue `work` together with a snapshot of the caller's ambient
    /// context. Returns immediately; the queue is unbounded, so submission
    /// never blocks and applies no backpressure.
    pub fn submit<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_captured(Box::new(work), AmbientContext::capture());
    }

    /// Enqueue with a context captured earlier (continuation registration
    /// snapshots at registration time, not dispatch time).
    pub(crate) fn submit_captured(
        &self,
        run: Box<dyn FnOnce() + Send + 'static>,
        context: AmbientContext,
    ) {
        // Send only fails once every worker is gone, i.e. mid-teardown;
        // items arriving that late are dropped.
        let _ = self.tx.send(Message::Item(WorkItem { run, context }));
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Everything already queued still runs; each worker exits when it
        // dequeues its terminate sentinel.
        for _ in 0..self.num_threads {
            let _ = self.tx.send(Message::Terminate);
        }

        // The last pool handle can be dropped from inside a worker (a task
        // cell holds one); that worker must not join itself. It exits on
        // its own sentinel after this drop returns.
        let current = thread::current().id();
        for thread in self.workers.drain(..) {
            if thread.thread().id() == current {
                continue;
            }
            let _ = thread.join();
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.num_threads)
            .finish()
    }
}
