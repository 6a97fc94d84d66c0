//! Topology validation
//!
//! Rules:
//! - field ranges from the `Validate` derives (non-zero sizes, name length)
//! - dispatcher names are unique
//! - a parent names an existing dispatcher other than itself
//! - parent and child share an element size
//! - parent links are acyclic

use std::collections::HashSet;

use contracts::{ContractError, TopologyConfig};
use tracing::debug;
use validator::Validate;

/// Validate a topology, returning the first error found
pub fn validate(topology: &TopologyConfig) -> Result<(), ContractError> {
    topology.validate()?;
    validate_unique_names(topology)?;
    validate_parents(topology)?;
    validate_acyclic(topology)?;
    debug!(dispatchers = topology.dispatchers.len(), "Topology validated");
    Ok(())
}

fn validate_unique_names(topology: &TopologyConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for dispatcher in &topology.dispatchers {
        if !seen.insert(dispatcher.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("dispatchers[name={}]", dispatcher.name),
                "duplicate dispatcher name",
            ));
        }
    }
    Ok(())
}

fn validate_parents(topology: &TopologyConfig) -> Result<(), ContractError> {
    for dispatcher in &topology.dispatchers {
        let Some(parent_name) = dispatcher.parent.as_deref() else {
            continue;
        };
        let field = format!("dispatchers[{}].parent", dispatcher.name);

        if parent_name == dispatcher.name {
            return Err(ContractError::config_validation(
                field,
                "a dispatcher cannot be its own parent",
            ));
        }
        let parent = topology.get(parent_name).ok_or_else(|| {
            ContractError::config_validation(
                field.clone(),
                format!("parent '{parent_name}' not found"),
            )
        })?;
        if parent.element_size != dispatcher.element_size {
            return Err(ContractError::config_validation(
                field,
                format!(
                    "element_size {} differs from parent '{}' element_size {}",
                    dispatcher.element_size, parent.name, parent.element_size
                ),
            ));
        }
    }
    Ok(())
}

fn validate_acyclic(topology: &TopologyConfig) -> Result<(), ContractError> {
    if topology.parent_first_order().is_none() {
        return Err(ContractError::config_validation(
            "dispatchers[*].parent",
            "parent links form a cycle",
        ));
    }
    Ok(())
}
