//! Metrics collection for pool monitoring.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters and latency distribution for one worker pool.
#[derive(Debug)]
pub struct Metrics {
    items_executed: AtomicU64,
    items_panicked: AtomicU64,
    busy_time_ns: AtomicU64,

    // Latency histogram (RwLock for interior mutability)
    latency_histogram: RwLock<Histogram<u64>>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        // 3 significant figures, max value of 1 hour in nanoseconds
        let histogram = Histogram::new_with_max(3_600_000_000_000, 3)
            .expect("failed to create latency histogram");

        Self {
            items_executed: AtomicU64::new(0),
            items_panicked: AtomicU64::new(0),
            busy_time_ns: AtomicU64::new(0),
            latency_histogram: RwLock::new(histogram),
            start_time: Instant::now(),
        }
    }

    /// Record one executed work item and how long it ran.
    pub fn record_execution(&self, duration_ns: u64) {
        self.items_executed.fetch_add(1, Ordering::Relaxed);
        self.busy_time_ns.fetch_add(duration_ns, Ordering::Relaxed);

        if let Some(mut hist) = self.latency_histogram.try_write() {
            let _ = hist.record(duration_ns);
        }
    }

    /// Record a work item that escaped with a panic.
    pub fn record_panic(&self) {
        self.items_panicked.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self.latency_histogram.read();

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            items_executed: self.items_executed.load(Ordering::Relaxed),
            items_panicked: self.items_panicked.load(Ordering::Relaxed),
            busy_time_ns: self.busy_time_ns.load(Ordering::Relaxed),
            avg_latency_ns: if histogram.len() > 0 {
                histogram.mean() as u64
            } else {
                0
            },
            p50_latency_ns: histogram.value_at_quantile(0.50),
            p95_latency_ns: histogram.value_at_quantile(0.95),
            p99_latency_ns: histogram.value_at_quantile(0.99),
            max_latency_ns: histogram.max(),
        }
    }

    /// Reset all counters and the histogram.
    pub fn reset(&self) {
        self.items_executed.store(0, Ordering::Relaxed);
        self.items_panicked.store(0, Ordering::Relaxed);
        self.busy_time_ns.store(0, Ordering::Relaxed);

        if let Some(mut hist) = self.latency_histogram.try_write() {
            hist.reset();
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime: std::time::Duration,
    pub items_executed: u64,
    pub items_panicked: u64,
    pub busy_time_ns: u64,
    pub avg_latency_ns: u64,
    pub p50_latency_ns: u64,
    pub p95_latency_ns: u64,
    pub p99_latency_ns: u64,
    pub max_latency_ns: u64,
}

impl MetricsSnapshot {
    /// Work items executed per second of pool uptime.
    pub fn items_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.items_executed as f64 / seconds
    }
}
