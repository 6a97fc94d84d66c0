//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::TopologyConfig;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<TopologySummary>,
}

#[derive(Serialize)]
struct TopologySummary {
    dispatcher_count: usize,
    root_count: usize,
    total_ring_bytes: usize,
    total_handler_slots: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating topology");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Topology validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(topology) => {
            let warnings = collect_warnings(&topology);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(TopologySummary {
                    dispatcher_count: topology.dispatchers.len(),
                    root_count: topology
                        .dispatchers
                        .iter()
                        .filter(|d| d.parent.is_none())
                        .count(),
                    total_ring_bytes: topology
                        .dispatchers
                        .iter()
                        .map(|d| d.ring_capacity.saturating_mul(d.element_size))
                        .sum(),
                    total_handler_slots: topology.dispatchers.iter().map(|d| d.max_handlers).sum(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Non-fatal topology issues
fn collect_warnings(topology: &TopologyConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    for d in &topology.dispatchers {
        // a queue longer than the ring lets pending records read overwritten slots
        if d.effective_queue_capacity() > d.ring_capacity {
            warnings.push(format!(
                "Dispatcher '{}' queue capacity {} exceeds ring capacity {}; queued records may read overwritten payloads",
                d.name,
                d.effective_queue_capacity(),
                d.ring_capacity
            ));
        }
        if d.worker.priority_hint == 0 {
            warnings.push(format!(
                "Dispatcher '{}' worker priority hint 0 is reported only and never applied",
                d.name
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Topology is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Dispatchers: {}", summary.dispatcher_count);
            println!("  Roots: {}", summary.root_count);
            println!("  Ring storage: {} bytes", summary.total_ring_bytes);
            println!("  Handler slots: {}", summary.total_handler_slots);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Topology is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
