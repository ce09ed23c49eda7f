//! One-shot timer service backing [`Runtime::delay`](crate::Runtime::delay).
//!
//! A single dedicated thread sleeps until the earliest scheduled deadline
//! and completes due tasks, so a pending delay never occupies a pool
//! worker. Deadlines still pending when the runtime tears down are dropped
//! unfired.

use crate::error::{Error, Result};
use crate::task::Deferred;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

pub(crate) struct Timer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

struct Shared {
    queue: Mutex<BinaryHeap<Entry>>,
    tick: Condvar,
    shutdown: AtomicBool,
    next_seq: AtomicU64,
}

struct Entry {
    deadline: Instant,
    seq: u64,
    task: Deferred,
}

// Earliest deadline first out of the max-heap; seq breaks ties in
// schedule order.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl Timer {
    pub(crate) fn new() -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            tick: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
        });

        let worker = shared.clone();
        let thread = thread::Builder::new()
            .name("deft-timer".to_string())
            .spawn(move || run(worker))
            .map_err(|e| Error::executor(format!("spawn failed: {}", e)))?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Complete `task` with success once `deadline` has passed.
    pub(crate) fn schedule(&self, deadline: Instant, task: Deferred) {
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        self.shared.queue.lock().push(Entry {
            deadline,
            seq,
            task,
        });
        self.shared.tick.notify_one();
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.tick.notify_one();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        let mut due = Vec::new();
        {
            let mut queue = shared.queue.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }

                let now = Instant::now();
                while queue.peek().map_or(false, |entry| entry.deadline <= now) {
                    due.push(queue.pop().expect("peeked entry vanished").task);
                }
                if !due.is_empty() {
                    break;
                }

                // Spurious or early wakes just re-check the head deadline.
                match queue.peek().map(|entry| entry.deadline) {
                    Some(deadline) => {
                        let _ = shared.tick.wait_until(&mut queue, deadline);
                    }
                    None => shared.tick.wait(&mut queue),
                }
            }
        }

        // Completion dispatches continuations through the pool; keep the
        // queue lock released while it runs.
        for task in due {
            task.complete_success();
        }
    }
}
