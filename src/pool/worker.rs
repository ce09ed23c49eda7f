// worker thread loop
use super::{Message, WorkItem};
use crate::config::ThreadPriority;
use crate::telemetry::Metrics;
use crossbeam_channel::Receiver;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

#[cfg(target_os = "linux")]
fn apply_thread_priority(id: usize, priority: ThreadPriority) {
    let nice = priority.nice_value();
    if nice == 0 {
        return;
    }
    // With PRIO_PROCESS and pid 0, setpriority targets the calling thread.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if result != 0 {
        eprintln!("worker {} failed to set thread priority {:?}", id, priority);
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_thread_priority(_id: usize, _priority: ThreadPriority) {}

// main loop: dequeue, reinstall the item's captured context, invoke, repeat
pub(crate) fn run(
    id: usize,
    priority: ThreadPriority,
    rx: Receiver<Message>,
    metrics: Arc<Metrics>,
) {
    apply_thread_priority(id, priority);

    loop {
        match rx.recv() {
            Ok(Message::Item(item)) => execute_item(id, item, &metrics),
            Ok(Message::Terminate) | Err(_) => break,
        }
    }
}

fn execute_item(id: usize, item: WorkItem, metrics: &Metrics) {
    let WorkItem { run, context } = item;
    let start = Instant::now();

    let result = catch_unwind(AssertUnwindSafe(|| context.run(run)));

    let duration_ns = start.elapsed().as_nanos() as u64;
    metrics.record_execution(duration_ns);

    if result.is_err() {
        // A panic here means a raw work item without its own handling; a
        // Deferred wrapper would have converted it into a failure state.
        eprintln!("worker {} caught a panic from a work item", id);
        metrics.record_panic();
    }
}
