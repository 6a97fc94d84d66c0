//! `run` command implementation.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use contracts::{Target, TopologyConfig};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading topology");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let topology = config_loader::ConfigLoader::load_from_path(&args.config)
        .map_err(CliError::from)
        .with_context(|| format!("Failed to load topology from {}", args.config.display()))?;

    info!(
        dispatchers = topology.dispatchers.len(),
        "Topology loaded"
    );

    if args.dry_run {
        info!("Dry run mode - topology is valid, exiting");
        print_topology_summary(&topology);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let pipeline = Pipeline::new(PipelineConfig {
        topology,
        entries: args.entries.clone(),
        events: args.events,
        producers: args.producers.max(1),
        target: Target::from_index(args.target_index),
        propagate: args.propagate,
        log_payloads: args.log_payloads,
        drain_timeout: Duration::from_secs(args.drain_timeout),
    });

    let cancel = Arc::new(AtomicBool::new(false));
    let mut task = tokio::spawn(pipeline.run(Arc::clone(&cancel)));

    info!("Starting pipeline...");

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping producers...");
            cancel.store(true, Ordering::Release);
            task.await
        }
    };

    let stats = joined
        .context("Pipeline task panicked")?
        .context("Pipeline execution failed")?;

    info!(
        events_sent = stats.events_sent,
        calls_dropped = stats.calls_dropped,
        duration_secs = stats.duration.as_secs_f64(),
        throughput = format!("{:.2}", stats.throughput()),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("Callback Dispatch finished");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print topology summary for dry-run mode
fn print_topology_summary(topology: &TopologyConfig) {
    println!("\n=== Topology Summary ===\n");
    println!("Dispatchers ({}):", topology.dispatchers.len());
    for d in &topology.dispatchers {
        println!(
            "  - {} (ring {} x {} B, queue {}, handlers {}){}",
            d.name,
            d.ring_capacity,
            d.element_size,
            d.effective_queue_capacity(),
            d.max_handlers,
            d.parent
                .as_deref()
                .map(|p| format!(" -> {p}"))
                .unwrap_or_default()
        );
    }
    println!();
}
