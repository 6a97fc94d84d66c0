//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{DispatcherConfig, TopologyConfig};

use crate::cli::InfoArgs;

/// Topology info for JSON output
#[derive(Serialize)]
struct TopologyInfo {
    dispatchers: Vec<DispatcherInfo>,
}

#[derive(Serialize)]
struct DispatcherInfo {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
    children: Vec<String>,
    ring_capacity: usize,
    element_size: usize,
    queue_capacity: usize,
    max_handlers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker: Option<WorkerInfo>,
}

#[derive(Serialize)]
struct WorkerInfo {
    thread_name: String,
    stack_size: usize,
    priority_hint: u8,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading topology info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let topology = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load topology from {}", args.config.display()))?;

    if args.json {
        let info = build_topology_info(&topology, args.workers);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize topology info")?;
        println!("{}", json);
    } else {
        print_topology_info(&topology, args.workers);
    }

    Ok(())
}

fn children_of<'a>(topology: &'a TopologyConfig, name: &str) -> Vec<&'a DispatcherConfig> {
    topology
        .dispatchers
        .iter()
        .filter(|d| d.parent.as_deref() == Some(name))
        .collect()
}

fn build_topology_info(topology: &TopologyConfig, workers: bool) -> TopologyInfo {
    let dispatchers = topology
        .dispatchers
        .iter()
        .map(|d| DispatcherInfo {
            name: d.name.clone(),
            parent: d.parent.clone(),
            children: children_of(topology, &d.name)
                .into_iter()
                .map(|c| c.name.clone())
                .collect(),
            ring_capacity: d.ring_capacity,
            element_size: d.element_size,
            queue_capacity: d.effective_queue_capacity(),
            max_handlers: d.max_handlers,
            worker: workers.then(|| WorkerInfo {
                thread_name: d.worker_name(),
                stack_size: d.worker.stack_size,
                priority_hint: d.worker.priority_hint,
            }),
        })
        .collect();

    TopologyInfo { dispatchers }
}

fn print_topology_info(topology: &TopologyConfig, workers: bool) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Callback Dispatch Topology                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🌳 Dispatchers ({})", topology.dispatchers.len());
    let roots: Vec<&DispatcherConfig> = topology
        .dispatchers
        .iter()
        .filter(|d| d.parent.is_none())
        .collect();
    let last = roots.len().saturating_sub(1);
    for (i, root) in roots.iter().enumerate() {
        print_node(topology, root, "   ", i == last, workers);
    }

    println!();
}

fn print_node(
    topology: &TopologyConfig,
    node: &DispatcherConfig,
    indent: &str,
    is_last: bool,
    workers: bool,
) {
    let prefix = if is_last { "└─" } else { "├─" };
    println!(
        "{}{} {} (ring {} x {} B, queue {}, handlers {})",
        indent,
        prefix,
        node.name,
        node.ring_capacity,
        node.element_size,
        node.effective_queue_capacity(),
        node.max_handlers
    );

    let child_indent = format!("{}{}", indent, if is_last { "   " } else { "│  " });
    if workers {
        println!(
            "{}   ⚙ worker {} (stack {} B, priority hint {})",
            child_indent,
            node.worker_name(),
            node.worker.stack_size,
            node.worker.priority_hint
        );
    }

    let children = children_of(topology, &node.name);
    let last = children.len().saturating_sub(1);
    for (i, child) in children.iter().enumerate() {
        print_node(topology, child, &child_indent, i == last, workers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_topology_info() {
        let mut leaf = DispatcherConfig::new("leaf", 4, 2);
        leaf.parent = Some("root".into());
        let topology = TopologyConfig {
            dispatchers: vec![DispatcherConfig::new("root", 8, 2), leaf],
        };

        let info = build_topology_info(&topology, true);
        assert_eq!(info.dispatchers[0].children, vec!["leaf"]);
        assert!(info.dispatchers[1].children.is_empty());
        assert_eq!(
            info.dispatchers[1].worker.as_ref().unwrap().thread_name,
            "leaf-worker"
        );

        let info = build_topology_info(&topology, false);
        assert!(info.dispatchers[0].worker.is_none());
    }
}
