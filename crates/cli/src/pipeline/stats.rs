//! Pipeline statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use observability::DispatchMetricsAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Calls accepted by entry dispatchers
    pub events_sent: u64,

    /// Calls refused because a queue was full
    pub calls_dropped: u64,

    /// Calls refused for any other reason
    pub calls_rejected: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Number of dispatchers in the topology
    pub dispatchers: usize,

    /// Queues drained before shutdown
    pub drained: bool,

    /// Producers were interrupted
    pub cancelled: bool,

    /// Counting handler invocations per dispatcher
    pub handler_counts: BTreeMap<String, u64>,

    /// Per-dispatcher snapshots and producer call latency
    pub metrics: DispatchMetricsAggregator,
}

impl PipelineStats {
    /// Accepted calls per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_sent as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Dispatchers: {}", self.dispatchers);
        println!("   ├─ Events sent: {}", self.events_sent);
        println!("   ├─ Dropped (queue full): {}", self.calls_dropped);
        println!("   ├─ Rejected: {}", self.calls_rejected);
        println!("   ├─ Throughput: {:.2} calls/s", self.throughput());
        println!("   └─ Drained: {}", if self.drained { "yes" } else { "no" });

        if !self.handler_counts.is_empty() {
            println!("\n📥 Handler Invocations");
            let last = self.handler_counts.len() - 1;
            for (i, (name, count)) in self.handler_counts.iter().enumerate() {
                let prefix = if i == last { "└─" } else { "├─" };
                println!("   {} {}: {}", prefix, name, count);
            }
        }

        println!("\n{}", self.metrics.summary());
    }
}
