//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - Contract serialization snapshots
//! - Topology file -> running dispatcher tree -> propagation
//! - Producers on async tasks and OS threads

#[cfg(test)]
mod contract_tests {
    use contracts::{DispatchRecord, MetricsSnapshot, Target};

    #[test]
    fn test_target_serialization() {
        assert_eq!(
            serde_json::to_string(&Target::Broadcast).unwrap(),
            r#""broadcast""#
        );
        assert_eq!(
            serde_json::to_string(&Target::Slot(3)).unwrap(),
            r#"{"slot":3}"#
        );
        let record = DispatchRecord {
            target: Target::from_index(-1),
            ring_slot: 2,
        };
        assert_eq!(record.target, Target::Broadcast);
    }

    #[test]
    fn test_metrics_snapshot_fields() {
        let snapshot = MetricsSnapshot {
            accepted: 3,
            dropped: 1,
            ..Default::default()
        };
        let value = serde_json::to_value(snapshot).unwrap();
        assert_eq!(value["accepted"], 3);
        assert_eq!(value["dropped"], 1);
        assert!((snapshot.drop_rate() - 25.0).abs() < 1e-9);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use bytemuck::{Pod, Zeroable};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{Flow, PodHandler, Target, TopologyConfig};
    use dispatcher::{CountingHandler, Dispatcher, DispatchError};
    use observability::DispatchMetricsAggregator;

    const TOPOLOGY: &str = r#"
[[dispatchers]]
name = "vehicle"
ring_capacity = 64
element_size = 16

[[dispatchers]]
name = "powertrain"
ring_capacity = 32
element_size = 16
max_handlers = 4
parent = "vehicle"

[[dispatchers]]
name = "engine"
ring_capacity = 16
element_size = 16
max_handlers = 4
parent = "powertrain"

[dispatchers.worker]
name = "engine-cb"
stack_size = 65536
"#;

    /// A CAN-style frame used as payload
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    struct Frame {
        id: u32,
        len: u32,
        data: [u8; 8],
    }

    fn frame(id: u32) -> Frame {
        Frame {
            id,
            len: 8,
            data: id.to_le_bytes().repeat(2).try_into().unwrap(),
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    /// Start every dispatcher of a topology, parents first
    fn build(topology: &TopologyConfig) -> BTreeMap<String, Dispatcher> {
        let mut built: BTreeMap<String, Dispatcher> = BTreeMap::new();
        for name in topology.parent_first_order().unwrap() {
            let config = topology.get(name).unwrap().clone();
            let dispatcher = Dispatcher::start(config.clone()).unwrap();
            if let Some(parent) = config.parent.as_deref() {
                dispatcher.set_parent(&built[parent]).unwrap();
            }
            built.insert(name.to_string(), dispatcher);
        }
        built
    }

    #[test]
    fn test_e2e_three_level_propagation() {
        observability::init_test_tracing();

        let topology = ConfigLoader::load_from_str(TOPOLOGY, ConfigFormat::Toml).unwrap();
        let tree = build(&topology);
        assert_eq!(tree["engine"].parent_name().as_deref(), Some("powertrain"));
        assert_eq!(tree["engine"].config().worker_name(), "engine-cb");

        // engine: two relays; powertrain: one relay and one sink; vehicle: collector
        let seen_at_vehicle = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen_at_vehicle);
        tree["vehicle"]
            .register_handler(
                Arc::new(PodHandler::new("collect", move |f: &Frame| {
                    sink.lock().unwrap().push(f.id);
                    Flow::Stop
                })),
                false,
            )
            .unwrap();

        tree["powertrain"]
            .register_fn("relay", |_: &[u8]| Flow::Propagate, false)
            .unwrap();
        let powertrain_sink = Arc::new(CountingHandler::new("pt-sink"));
        tree["powertrain"]
            .register_handler(powertrain_sink.clone(), false)
            .unwrap();

        for name in ["relay-a", "relay-b"] {
            tree["engine"]
                .register_fn(name, |_: &[u8]| Flow::Propagate, false)
                .unwrap();
        }

        for id in 1..=4 {
            tree["engine"].call_pod(&frame(id), Target::Broadcast).unwrap();
        }

        // each engine record reaches powertrain twice, each powertrain record reaches vehicle once
        assert!(wait_for(|| seen_at_vehicle.lock().unwrap().len() == 8));
        assert_eq!(powertrain_sink.invocations(), 8);

        let mut ids = seen_at_vehicle.lock().unwrap().clone();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 1, 2, 2, 3, 3, 4, 4]);

        assert_eq!(tree["vehicle"].poll_last_pod::<Frame>().unwrap().map(|f| f.id), Some(4));

        assert!(wait_for(|| tree["engine"].metrics().propagated == 8
            && tree["powertrain"].metrics().propagated == 8));

        let mut aggregator = DispatchMetricsAggregator::new();
        for (name, dispatcher) in &tree {
            aggregator.update(name, dispatcher.metrics());
        }
        let summary = aggregator.summary();
        assert_eq!(summary.per_dispatcher["powertrain"].accepted, 8);
        assert_eq!(summary.per_dispatcher["vehicle"].accepted, 8);
        assert_eq!(summary.total.propagated, 16);
        assert_eq!(summary.total.dropped, 0);
    }

    #[test]
    fn test_e2e_targeted_handlers() {
        let topology = ConfigLoader::load_from_str(TOPOLOGY, ConfigFormat::Toml).unwrap();
        let tree = build(&topology);
        let engine = &tree["engine"];

        let any = Arc::new(CountingHandler::new("any"));
        let rpm = Arc::new(CountingHandler::new("rpm"));
        let temp = Arc::new(CountingHandler::new("temp"));
        assert_eq!(engine.register_handler(any.clone(), false).unwrap(), 0);
        assert_eq!(engine.register_handler(rpm.clone(), true).unwrap(), 1);
        assert_eq!(engine.register_handler(temp.clone(), true).unwrap(), 2);

        engine.call_pod(&frame(10), Target::from_index(1)).unwrap();
        engine.call_pod(&frame(11), Target::from_index(2)).unwrap();
        engine.call_pod(&frame(12), Target::from_index(-1)).unwrap();

        assert!(wait_for(|| engine.metrics().records_dispatched == 3));
        assert_eq!(any.invocations(), 3);
        assert_eq!(rpm.invocations(), 2);
        assert_eq!(temp.invocations(), 2);
        assert_eq!(
            bytemuck::pod_read_unaligned::<Frame>(&rpm.last_payload()).id,
            12
        );
    }

    #[test]
    fn test_e2e_shutdown_parent_first() {
        let topology = ConfigLoader::load_from_str(TOPOLOGY, ConfigFormat::Toml).unwrap();
        let tree = build(&topology);
        tree["engine"]
            .register_fn("relay", |_: &[u8]| Flow::Propagate, false)
            .unwrap();

        // a stopped parent refuses forwarded payloads; the child keeps running
        tree["powertrain"].stop();
        tree["engine"].call_pod(&frame(1), Target::Broadcast).unwrap();
        assert!(wait_for(|| tree["engine"].metrics().forward_failures == 1));
        assert_eq!(tree["engine"].metrics().propagated, 0);
        assert!(matches!(
            tree["powertrain"].call_pod(&frame(2), Target::Broadcast),
            Err(DispatchError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_e2e_async_producers() {
        let topology = ConfigLoader::load_from_str(TOPOLOGY, ConfigFormat::Toml).unwrap();
        let mut tree = build(&topology);
        let vehicle = Arc::new(tree.remove("vehicle").unwrap());

        let received = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&received);
        vehicle
            .register_fn(
                "count",
                move |_: &[u8]| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Flow::Stop
                },
                false,
            )
            .unwrap();

        // call never blocks, so it is safe on runtime threads
        let tasks: Vec<_> = (0..4u32)
            .map(|task| {
                let vehicle = Arc::clone(&vehicle);
                tokio::spawn(async move {
                    let mut accepted = 0u64;
                    for i in 0..8 {
                        match vehicle.call_pod(&frame(task * 100 + i), Target::Broadcast) {
                            Ok(_) => accepted += 1,
                            Err(e) => assert!(e.is_dropped(), "unexpected error: {e}"),
                        }
                        tokio::task::yield_now().await;
                    }
                    accepted
                })
            })
            .collect();

        let mut accepted = 0;
        for task in tasks {
            accepted += task.await.unwrap();
        }

        assert!(wait_for(|| received.load(Ordering::Relaxed) == accepted));
        assert_eq!(vehicle.metrics().accepted, accepted);
        assert_eq!(accepted + vehicle.metrics().dropped, 32);
    }
}
