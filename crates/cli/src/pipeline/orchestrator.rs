//! Pipeline orchestrator - builds the dispatcher tree and drives producers.
//!
//! Dispatchers are created parent-first so every child can be linked to an
//! already running parent; shutdown runs in the opposite order so children
//! never forward into a stopped parent.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use contracts::{Flow, Target, TopologyConfig};
use dispatcher::{CountingHandler, Dispatcher, LogHandler, WorkerState};
use observability::{DispatchMetricsAggregator, RunningStats};
use tracing::{debug, info, warn};

use super::PipelineStats;
use crate::error::{CliError, Result};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Dispatchers and their parent links
    pub topology: TopologyConfig,

    /// Dispatchers fed by producers (empty = every leaf)
    pub entries: Vec<String>,

    /// Events per producer per entry dispatcher
    pub events: u64,

    /// Producer thread count
    pub producers: usize,

    /// Target of every generated call
    pub target: Target,

    /// Verdict of the attached counting handlers
    pub propagate: bool,

    /// Attach a `LogHandler` to every dispatcher
    pub log_payloads: bool,

    /// Upper bound on waiting for queues to drain
    pub drain_timeout: Duration,
}

/// Running dispatchers of one topology, parents before children
pub struct Topology {
    dispatchers: Vec<Arc<Dispatcher>>,
    counters: BTreeMap<String, Arc<CountingHandler>>,
}

impl Topology {
    /// Start every dispatcher, link parents and attach a counting handler to each
    pub fn build(config: &TopologyConfig, flow: Flow, log_payloads: bool) -> Result<Self> {
        let order = config
            .parent_first_order()
            .ok_or_else(|| CliError::pipeline_execution("parent links form a cycle"))?;

        let mut dispatchers: Vec<Arc<Dispatcher>> = Vec::with_capacity(order.len());
        let mut counters = BTreeMap::new();

        for name in order {
            let dispatcher_config = config.get(name).ok_or_else(|| CliError::UnknownDispatcher {
                name: name.to_string(),
            })?;
            let dispatcher =
                Dispatcher::start(dispatcher_config.clone()).map_err(|e| CliError::dispatch(name, e))?;

            if let Some(parent_name) = dispatcher_config.parent.as_deref() {
                let parent = dispatchers
                    .iter()
                    .find(|d| d.name() == parent_name)
                    .ok_or_else(|| CliError::UnknownDispatcher {
                        name: parent_name.to_string(),
                    })?;
                dispatcher
                    .set_parent(parent)
                    .map_err(|e| CliError::dispatch(name, e))?;
            }

            let counter = Arc::new(CountingHandler::new(format!("{name}-count")).with_flow(flow));
            dispatcher
                .register_handler(counter.clone(), false)
                .map_err(|e| CliError::dispatch(name, e))?;
            if log_payloads {
                dispatcher
                    .register_handler(Arc::new(LogHandler::new(format!("{name}-log"))), false)
                    .map_err(|e| CliError::dispatch(name, e))?;
            }

            debug!(
                dispatcher = name,
                parent = ?dispatcher_config.parent,
                "Dispatcher ready"
            );
            counters.insert(name.to_string(), counter);
            dispatchers.push(Arc::new(dispatcher));
        }

        info!(dispatchers = dispatchers.len(), "Topology built");
        Ok(Self {
            dispatchers,
            counters,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Dispatcher>> {
        self.dispatchers.iter().find(|d| d.name() == name)
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    /// Dispatchers that are nobody's parent
    pub fn leaves(&self) -> Vec<&str> {
        self.dispatchers
            .iter()
            .map(|d| d.name())
            .filter(|name| {
                !self
                    .dispatchers
                    .iter()
                    .any(|d| d.config().parent.as_deref() == Some(*name))
            })
            .collect()
    }

    /// Invocations seen by each dispatcher's counting handler
    pub fn handler_counts(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|(name, counter)| (name.clone(), counter.invocations()))
            .collect()
    }

    /// Wait until no queue holds records and no worker is mid-dispatch
    ///
    /// Propagation can refill a parent queue after it looked empty, so the
    /// idle condition has to hold on two consecutive checks.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut idle_checks = 0;
        while Instant::now() < deadline {
            let idle = self.dispatchers.iter().all(|d| {
                d.queue_len() == 0 && d.worker_state() != WorkerState::Dispatching
            });
            idle_checks = if idle { idle_checks + 1 } else { 0 };
            if idle_checks >= 2 {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    /// Copy every dispatcher's counters into the aggregator
    pub fn collect(&self, aggregator: &mut DispatchMetricsAggregator) {
        for dispatcher in &self.dispatchers {
            aggregator.update(dispatcher.name(), dispatcher.metrics());
        }
    }

    /// Stop children before parents
    pub fn shutdown(&self) {
        for dispatcher in self.dispatchers.iter().rev() {
            dispatcher.stop();
        }
        info!("Topology stopped");
    }
}

/// What one producer thread did
#[derive(Debug, Default)]
struct ProducerReport {
    sent: u64,
    dropped: u64,
    rejected: u64,
    latency_us: RunningStats,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline on the blocking pool until producers finish or `cancel` is set
    pub async fn run(self, cancel: Arc<AtomicBool>) -> Result<PipelineStats> {
        tokio::task::spawn_blocking(move || self.run_blocking(&cancel))
            .await
            .map_err(|e| CliError::pipeline_execution(format!("pipeline task failed: {e}")))?
    }

    fn run_blocking(self, cancel: &AtomicBool) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let flow = Flow::from(self.config.propagate);
        let topology = Topology::build(&self.config.topology, flow, self.config.log_payloads)?;

        let entry_names: Vec<String> = if self.config.entries.is_empty() {
            topology.leaves().into_iter().map(str::to_string).collect()
        } else {
            self.config.entries.clone()
        };
        let entries = entry_names
            .iter()
            .map(|name| {
                topology
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CliError::UnknownDispatcher { name: name.clone() })
            })
            .collect::<Result<Vec<_>>>();
        let entries = match entries {
            Ok(entries) => entries,
            Err(e) => {
                topology.shutdown();
                return Err(e);
            }
        };

        info!(
            entries = ?entry_names,
            producers = self.config.producers,
            events = self.config.events,
            target = %self.config.target,
            "Starting producers"
        );

        let reports = self.spawn_producers(&entries, cancel);
        let reports = match reports {
            Ok(reports) => reports,
            Err(e) => {
                topology.shutdown();
                return Err(e);
            }
        };

        let drained = topology.wait_idle(self.config.drain_timeout);
        if !drained {
            warn!(
                timeout_secs = self.config.drain_timeout.as_secs_f64(),
                "Queues did not drain before timeout"
            );
        }

        let mut stats = PipelineStats {
            dispatchers: topology.len(),
            drained,
            cancelled: cancel.load(Ordering::Acquire),
            ..Default::default()
        };
        for report in &reports {
            stats.events_sent += report.sent;
            stats.calls_dropped += report.dropped;
            stats.calls_rejected += report.rejected;
            stats.metrics.merge_latency(&report.latency_us);
        }
        topology.collect(&mut stats.metrics);
        stats.handler_counts = topology.handler_counts();

        topology.shutdown();
        stats.duration = start_time.elapsed();
        Ok(stats)
    }

    fn spawn_producers(
        &self,
        entries: &[Arc<Dispatcher>],
        cancel: &AtomicBool,
    ) -> Result<Vec<ProducerReport>> {
        let events = self.config.events;
        let target = self.config.target;

        thread::scope(|scope| -> Result<Vec<ProducerReport>> {
            let mut handles = Vec::with_capacity(self.config.producers);
            for id in 0..self.config.producers {
                let handle = thread::Builder::new()
                    .name(format!("producer-{id}"))
                    .spawn_scoped(scope, move || produce(id, entries, events, target, cancel))?;
                handles.push(handle);
            }

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| CliError::pipeline_execution("producer thread panicked"))
                })
                .collect()
        })
    }
}

/// Fill `buf` with a payload identifying the producer and sequence number
fn encode_event(buf: &mut [u8], producer: usize, seq: u64) {
    let tag = ((producer as u64) << 48) | (seq & 0xFFFF_FFFF_FFFF);
    let bytes = tag.to_le_bytes();
    let n = buf.len().min(bytes.len());
    buf.fill(0);
    buf[..n].copy_from_slice(&bytes[..n]);
}

fn produce(
    id: usize,
    entries: &[Arc<Dispatcher>],
    events: u64,
    target: Target,
    cancel: &AtomicBool,
) -> ProducerReport {
    let mut report = ProducerReport::default();
    let mut buf = Vec::new();

    for seq in 0..events {
        if cancel.load(Ordering::Acquire) {
            debug!(producer = id, seq, "Producer cancelled");
            break;
        }
        for dispatcher in entries {
            buf.resize(dispatcher.element_size(), 0);
            encode_event(&mut buf, id, seq);

            let started = Instant::now();
            match dispatcher.call(&buf, target) {
                Ok(_) => report.sent += 1,
                Err(e) if e.is_dropped() => report.dropped += 1,
                Err(e) => {
                    report.rejected += 1;
                    warn!(producer = id, dispatcher = dispatcher.name(), error = %e, "Call rejected");
                }
            }
            report
                .latency_us
                .push(started.elapsed().as_secs_f64() * 1_000_000.0);
        }
    }

    report
}
