//! Dispatcher metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::MetricsSnapshot;
use observability::DispatchCounters;

/// Metrics for a single dispatcher
///
/// Local atomics back [`DispatcherMetrics::snapshot`]; every increment is
/// mirrored to the process-wide recorder through [`DispatchCounters`].
#[derive(Debug)]
pub struct DispatcherMetrics {
    accepted: AtomicU64,
    dropped: AtomicU64,
    records_dispatched: AtomicU64,
    handler_invocations: AtomicU64,
    propagated: AtomicU64,
    forward_failures: AtomicU64,
    counters: DispatchCounters,
}

impl DispatcherMetrics {
    /// Create metrics labelled with the dispatcher name
    pub fn new(dispatcher: &str) -> Self {
        Self {
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            records_dispatched: AtomicU64::new(0),
            handler_invocations: AtomicU64::new(0),
            propagated: AtomicU64::new(0),
            forward_failures: AtomicU64::new(0),
            counters: DispatchCounters::register(dispatcher),
        }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn inc_accepted(&self, queue_len: usize) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.counters.accepted.increment(1);
        self.counters.queue_depth.set(queue_len as f64);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.counters.dropped.increment(1);
    }

    pub fn records_dispatched(&self) -> u64 {
        self.records_dispatched.load(Ordering::Relaxed)
    }

    /// Count one evaluated record and how long its handlers took
    pub fn record_dispatched(&self, elapsed_us: f64, queue_len: usize) {
        self.records_dispatched.fetch_add(1, Ordering::Relaxed);
        self.counters.records.increment(1);
        self.counters.dispatch_latency_us.record(elapsed_us);
        self.counters.queue_depth.set(queue_len as f64);
    }

    pub fn handler_invocations(&self) -> u64 {
        self.handler_invocations.load(Ordering::Relaxed)
    }

    pub fn inc_handler_invocations(&self) {
        self.handler_invocations.fetch_add(1, Ordering::Relaxed);
        self.counters.invocations.increment(1);
    }

    pub fn propagated(&self) -> u64 {
        self.propagated.load(Ordering::Relaxed)
    }

    pub fn inc_propagated(&self) {
        self.propagated.fetch_add(1, Ordering::Relaxed);
        self.counters.propagated.increment(1);
    }

    pub fn forward_failures(&self) -> u64 {
        self.forward_failures.load(Ordering::Relaxed)
    }

    pub fn inc_forward_failures(&self) {
        self.forward_failures.fetch_add(1, Ordering::Relaxed);
        self.counters.forward_failures.increment(1);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted(),
            dropped: self.dropped(),
            records_dispatched: self.records_dispatched(),
            handler_invocations: self.handler_invocations(),
            propagated: self.propagated(),
            forward_failures: self.forward_failures(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = DispatcherMetrics::new("test");
        metrics.inc_accepted(1);
        metrics.inc_accepted(2);
        metrics.inc_dropped();
        metrics.record_dispatched(12.5, 1);
        metrics.inc_handler_invocations();
        metrics.inc_propagated();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.accepted, 2);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.records_dispatched, 1);
        assert_eq!(snapshot.handler_invocations, 1);
        assert_eq!(snapshot.propagated, 1);
        assert_eq!(snapshot.forward_failures, 0);
    }
}
