//! Runtime lifecycle and the task-creation surface.
//!
//! A [`Runtime`] owns the worker pool and the timer. It is meant to be
//! constructed once and torn down at process exit; the global
//! [`init`]/[`shutdown`] layer enforces that single-instance lifecycle for
//! the free-function API, while tests construct private runtimes directly.

use crate::config::Config;
use crate::error::{Error, Result, TaskError};
use crate::pool::WorkerPool;
use crate::task::{settle, Deferred, ValueTask};
use crate::telemetry::MetricsSnapshot;
use crate::timer::Timer;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Owns the worker pool and timer; all task creation goes through it.
pub struct Runtime {
    // declared before the pool so its thread is joined first on drop
    timer: Timer,
    pool: Arc<WorkerPool>,
    config: Config,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(WorkerPool::new(&config)?);
        let timer = Timer::new()?;

        Ok(Self {
            timer,
            pool,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn num_threads(&self) -> usize {
        self.pool.num_threads()
    }

    /// A snapshot of the pool's execution metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.pool.metrics().snapshot()
    }

    pub(crate) fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Enqueue a bare work item on the pool. Nothing is returned to the
    /// caller and nothing is caught on its behalf; prefer
    /// [`spawn`](Runtime::spawn) unless fire-and-forget is really meant.
    pub fn submit<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.submit(work);
    }

    /// A task in the pending state, to be completed by some other path.
    pub fn pending(&self) -> Deferred {
        Deferred::pending_in(self.pool.clone())
    }

    /// Run `f` on the pool; the returned task completes with success when
    /// `f` returns `Ok`, or with failure carrying its error or panic.
    pub fn spawn<F>(&self, f: F) -> Deferred
    where
        F: FnOnce() -> std::result::Result<(), TaskError> + Send + 'static,
    {
        let task = self.pending();
        let target = task.clone();
        self.pool.submit(move || settle(&target, f));
        task
    }

    /// A task that completes with success after at least `duration`.
    ///
    /// Scheduled on the timer thread, so waiting consumes no pool worker;
    /// a zero duration completes immediately.
    pub fn delay(&self, duration: Duration) -> Deferred {
        let task = self.pending();
        if duration.is_zero() {
            task.complete_success();
        } else {
            self.timer.schedule(Instant::now() + duration, task.clone());
        }
        task
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("num_threads", &self.pool.num_threads())
            .finish()
    }
}

// Global runtime for the free-function API
static GLOBAL_RUNTIME: RwLock<Option<Arc<Runtime>>> = RwLock::new(None);

/// Initialize the global runtime with default configuration.
pub fn init() -> Result<()> {
    init_with_config(Config::default())
}

/// Initialize the global runtime. Fails if one is already running.
pub fn init_with_config(config: Config) -> Result<()> {
    let mut runtime = GLOBAL_RUNTIME.write();

    if runtime.is_some() {
        return Err(Error::AlreadyInitialized);
    }

    *runtime = Some(Arc::new(Runtime::new(config)?));
    Ok(())
}

/// Tear down the global runtime. Workers drain what is already queued,
/// then exit; pending delays are dropped unfired.
pub fn shutdown() {
    let mut runtime = GLOBAL_RUNTIME.write();
    *runtime = None;
}

pub(crate) fn current_runtime() -> Arc<Runtime> {
    GLOBAL_RUNTIME
        .read()
        .as_ref()
        .expect("deft runtime not initialized - call deft::init() first")
        .clone()
}

/// [`Runtime::spawn`] on the global runtime.
pub fn spawn<F>(f: F) -> Deferred
where
    F: FnOnce() -> std::result::Result<(), TaskError> + Send + 'static,
{
    current_runtime().spawn(f)
}

/// [`Runtime::spawn_value`] on the global runtime.
pub fn spawn_value<T, F>(f: F) -> ValueTask<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, TaskError> + Send + 'static,
{
    current_runtime().spawn_value(f)
}

/// [`Runtime::delay`] on the global runtime.
pub fn delay(duration: Duration) -> Deferred {
    current_runtime().delay(duration)
}

/// [`Runtime::join_all`] on the global runtime.
pub fn join_all<I>(tasks: I) -> Deferred
where
    I: IntoIterator<Item = Deferred>,
{
    current_runtime().join_all(tasks)
}

/// [`Runtime::iterate`] on the global runtime.
pub fn iterate<I>(tasks: I) -> Deferred
where
    I: IntoIterator<Item = Deferred>,
    I::IntoIter: Send + 'static,
{
    current_runtime().iterate(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The one test that touches the global runtime; everything else in
    // this crate builds private Runtime values to stay race-free.
    #[test]
    fn test_global_lifecycle() {
        shutdown();

        assert!(init().is_ok());
        assert!(matches!(init(), Err(Error::AlreadyInitialized)));

        let task = spawn(|| Ok(()));
        assert!(task.wait().is_ok());

        shutdown();
    }

    #[test]
    fn test_runtime_new_with_custom_config() {
        let config = Config::builder().num_threads(2).build().unwrap();
        let rt = Runtime::new(config).unwrap();

        assert_eq!(rt.num_threads(), 2);
        assert!(rt.spawn(|| Ok(())).wait().is_ok());
    }

    #[test]
    fn test_metrics_count_executions() {
        let rt = Runtime::new(Config::builder().num_threads(1).build().unwrap()).unwrap();

        for _ in 0..4 {
            rt.spawn(|| Ok(())).wait().unwrap();
        }

        assert!(rt.metrics().items_executed >= 4);
    }
}
