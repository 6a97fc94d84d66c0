//! Dispatcher metrics collection
//!
//! Two layers: `metrics` handles registered once per dispatcher (exported
//! through whatever recorder is installed), and an in-memory aggregator used
//! to print run summaries.

use std::collections::BTreeMap;

use contracts::MetricsSnapshot;
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

/// Recorder handles for one dispatcher
///
/// Handles are resolved against the recorder installed at registration time,
/// so observability must be initialized before dispatchers are built.
/// Incrementing a handle does not allocate.
#[derive(Clone)]
pub struct DispatchCounters {
    pub accepted: Counter,
    pub dropped: Counter,
    pub records: Counter,
    pub invocations: Counter,
    pub propagated: Counter,
    pub forward_failures: Counter,
    pub queue_depth: Gauge,
    pub dispatch_latency_us: Histogram,
}

impl DispatchCounters {
    /// Register all handles labelled with the dispatcher name
    pub fn register(dispatcher: &str) -> Self {
        let label = dispatcher.to_string();
        Self {
            accepted: counter!("callback_calls_accepted_total", "dispatcher" => label.clone()),
            dropped: counter!("callback_calls_dropped_total", "dispatcher" => label.clone()),
            records: counter!("callback_records_dispatched_total", "dispatcher" => label.clone()),
            invocations: counter!("callback_handler_invocations_total", "dispatcher" => label.clone()),
            propagated: counter!("callback_propagated_total", "dispatcher" => label.clone()),
            forward_failures: counter!("callback_forward_failures_total", "dispatcher" => label.clone()),
            queue_depth: gauge!("callback_queue_depth", "dispatcher" => label.clone()),
            dispatch_latency_us: histogram!("callback_dispatch_latency_us", "dispatcher" => label),
        }
    }
}

impl std::fmt::Debug for DispatchCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCounters").finish_non_exhaustive()
    }
}

/// Record the number of registered handlers of a dispatcher
pub fn record_registered_handlers(dispatcher: &str, count: usize) {
    gauge!(
        "callback_registered_handlers",
        "dispatcher" => dispatcher.to_string()
    )
    .set(count as f64);
}

/// Aggregates dispatcher snapshots and producer-side call latency
#[derive(Debug, Clone, Default)]
pub struct DispatchMetricsAggregator {
    /// Latest snapshot per dispatcher
    pub dispatchers: BTreeMap<String, MetricsSnapshot>,

    /// Time spent inside `call` (microseconds)
    pub call_latency_us: RunningStats,
}

impl DispatchMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored snapshot of one dispatcher
    pub fn update(&mut self, dispatcher: &str, snapshot: MetricsSnapshot) {
        self.dispatchers.insert(dispatcher.to_string(), snapshot);
    }

    /// Add one call latency sample
    pub fn push_call_latency_us(&mut self, micros: f64) {
        self.call_latency_us.push(micros);
    }

    /// Merge latency samples collected elsewhere (e.g. per producer thread)
    pub fn merge_latency(&mut self, other: &RunningStats) {
        self.call_latency_us.merge(other);
    }

    /// Generate summary report
    pub fn summary(&self) -> MetricsSummary {
        let total = self
            .dispatchers
            .values()
            .fold(MetricsSnapshot::default(), |mut acc, s| {
                acc.accepted += s.accepted;
                acc.dropped += s.dropped;
                acc.records_dispatched += s.records_dispatched;
                acc.handler_invocations += s.handler_invocations;
                acc.propagated += s.propagated;
                acc.forward_failures += s.forward_failures;
                acc
            });

        MetricsSummary {
            total,
            drop_rate: total.drop_rate(),
            call_latency_us: StatsSummary::from(&self.call_latency_us),
            per_dispatcher: self.dispatchers.clone(),
        }
    }
}

/// Summary report
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total: MetricsSnapshot,
    pub drop_rate: f64,
    pub call_latency_us: StatsSummary,
    pub per_dispatcher: BTreeMap<String, MetricsSnapshot>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Dispatch Metrics Summary ===")?;
        writeln!(f, "Accepted calls: {}", self.total.accepted)?;
        writeln!(
            f,
            "Dropped calls: {} ({:.2}%)",
            self.total.dropped, self.drop_rate
        )?;
        writeln!(f, "Records dispatched: {}", self.total.records_dispatched)?;
        writeln!(f, "Handler invocations: {}", self.total.handler_invocations)?;
        writeln!(f, "Propagated: {}", self.total.propagated)?;
        writeln!(f, "Call latency (us): {}", self.call_latency_us)?;

        if !self.per_dispatcher.is_empty() {
            writeln!(f, "Per dispatcher:")?;
            for (name, s) in &self.per_dispatcher {
                writeln!(
                    f,
                    "  {}: accepted={} dropped={} invocations={} propagated={}",
                    name, s.accepted, s.dropped, s.handler_invocations, s.propagated
                )?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a sample
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// Combine with another accumulator (Chan et al. parallel update)
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.count as f64 / count as f64;
        let m2 = self.m2
            + other.m2
            + delta * delta * (self.count as f64 * other.count as f64) / count as f64;

        self.count = count;
        self.mean = mean;
        self.m2 = m2;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        stats.push(1.0);
        stats.push(2.0);
        stats.push(3.0);
        stats.push(4.0);
        stats.push(5.0);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_running_stats_merge_matches_sequential() {
        let mut left = RunningStats::default();
        let mut right = RunningStats::default();
        let mut all = RunningStats::default();
        for v in [1.0, 2.0, 3.0] {
            left.push(v);
            all.push(v);
        }
        for v in [4.0, 5.0] {
            right.push(v);
            all.push(v);
        }

        left.merge(&right);
        assert_eq!(left.count(), all.count());
        assert!((left.mean() - all.mean()).abs() < 1e-10);
        assert!((left.variance() - all.variance()).abs() < 1e-10);
        assert!((left.max() - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = DispatchMetricsAggregator::new();

        aggregator.update(
            "root",
            MetricsSnapshot {
                accepted: 10,
                dropped: 2,
                propagated: 0,
                ..Default::default()
            },
        );
        aggregator.update(
            "child",
            MetricsSnapshot {
                accepted: 6,
                dropped: 2,
                propagated: 4,
                ..Default::default()
            },
        );
        // later snapshots replace earlier ones
        aggregator.update(
            "child",
            MetricsSnapshot {
                accepted: 8,
                dropped: 0,
                propagated: 4,
                ..Default::default()
            },
        );

        let summary = aggregator.summary();
        assert_eq!(summary.total.accepted, 18);
        assert_eq!(summary.total.dropped, 2);
        assert_eq!(summary.total.propagated, 4);
        assert_eq!(summary.per_dispatcher.len(), 2);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = DispatchMetricsAggregator::new();
        aggregator.update(
            "bus",
            MetricsSnapshot {
                accepted: 95,
                dropped: 5,
                ..Default::default()
            },
        );
        aggregator.push_call_latency_us(3.0);

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Accepted calls: 95"));
        assert!(output.contains("5.00%"));
        assert!(output.contains("bus: accepted=95"));
    }

    #[test]
    fn test_counters_register_without_recorder() {
        let counters = DispatchCounters::register("noop");
        counters.accepted.increment(1);
        counters.queue_depth.set(3.0);
        counters.dispatch_latency_us.record(1.5);
    }
}
