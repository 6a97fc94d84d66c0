//! Dispatcher configuration contracts that can be shared across crates.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default number of payload slots in the ring
pub const DEFAULT_RING_CAPACITY: usize = 16;

/// Default number of handler slots in the registry
pub const DEFAULT_MAX_HANDLERS: usize = 100;

/// Default worker stack size in bytes
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

/// Configuration of one dispatcher instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DispatcherConfig {
    /// Dispatcher name (used for logging/metrics and parent links)
    #[validate(length(min = 1, max = 64))]
    pub name: String,

    /// Number of payload slots in the ring
    #[serde(default = "default_ring_capacity")]
    #[validate(range(min = 1))]
    pub ring_capacity: usize,

    /// Size of one payload in bytes
    #[validate(range(min = 1))]
    pub element_size: usize,

    /// Dispatch queue capacity (defaults to `ring_capacity`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub queue_capacity: Option<usize>,

    /// Number of handler slots
    #[serde(default = "default_max_handlers")]
    #[validate(range(min = 1))]
    pub max_handlers: usize,

    /// Worker thread settings
    #[serde(default)]
    #[validate(nested)]
    pub worker: WorkerConfig,

    /// Name of the dispatcher that receives propagated payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

fn default_ring_capacity() -> usize {
    DEFAULT_RING_CAPACITY
}

fn default_max_handlers() -> usize {
    DEFAULT_MAX_HANDLERS
}

impl DispatcherConfig {
    /// Configuration with default queue, registry and worker settings
    pub fn new(name: impl Into<String>, ring_capacity: usize, element_size: usize) -> Self {
        Self {
            name: name.into(),
            ring_capacity,
            element_size,
            queue_capacity: None,
            max_handlers: DEFAULT_MAX_HANDLERS,
            worker: WorkerConfig::default(),
            parent: None,
        }
    }

    /// Queue capacity after applying the default
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.ring_capacity)
    }

    /// Worker thread name after applying the default
    pub fn worker_name(&self) -> String {
        self.worker
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-worker", self.name))
    }
}

/// Worker thread settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct WorkerConfig {
    /// Thread name (defaults to `<dispatcher>-worker`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,

    /// Stack size in bytes
    #[serde(default = "default_stack_size")]
    #[validate(range(min = 16384))]
    pub stack_size: usize,

    /// Scheduling priority hint; reported, not applied to the OS thread
    #[serde(default = "default_priority_hint", alias = "priority")]
    pub priority_hint: u8,
}

fn default_stack_size() -> usize {
    DEFAULT_STACK_SIZE
}

fn default_priority_hint() -> u8 {
    1
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: None,
            stack_size: DEFAULT_STACK_SIZE,
            priority_hint: default_priority_hint(),
        }
    }
}

/// A set of dispatchers linked by parent names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TopologyConfig {
    #[validate(length(min = 1), nested)]
    pub dispatchers: Vec<DispatcherConfig>,
}

impl TopologyConfig {
    /// Look up a dispatcher by name
    pub fn get(&self, name: &str) -> Option<&DispatcherConfig> {
        self.dispatchers.iter().find(|d| d.name == name)
    }

    /// Names in an order where every parent precedes its children
    ///
    /// Returns `None` if the parent links contain a cycle or a dangling name.
    pub fn parent_first_order(&self) -> Option<Vec<&str>> {
        let mut ordered: Vec<&str> = Vec::with_capacity(self.dispatchers.len());
        while ordered.len() < self.dispatchers.len() {
            let before = ordered.len();
            for d in &self.dispatchers {
                if ordered.contains(&d.name.as_str()) {
                    continue;
                }
                let ready = match d.parent.as_deref() {
                    None => true,
                    Some(parent) => ordered.contains(&parent),
                };
                if ready {
                    ordered.push(&d.name);
                }
            }
            if ordered.len() == before {
                return None;
            }
        }
        Some(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: DispatcherConfig =
            serde_json::from_str(r#"{"name": "can", "element_size": 8}"#).unwrap();
        assert_eq!(config.ring_capacity, DEFAULT_RING_CAPACITY);
        assert_eq!(config.max_handlers, DEFAULT_MAX_HANDLERS);
        assert_eq!(config.effective_queue_capacity(), DEFAULT_RING_CAPACITY);
        assert_eq!(config.worker_name(), "can-worker");
        assert_eq!(config.worker.stack_size, DEFAULT_STACK_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = DispatcherConfig::new("bad", 0, 8);
        assert!(config.validate().is_err());

        let mut config = DispatcherConfig::new("bad", 4, 8);
        config.queue_capacity = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parent_first_order() {
        let mut child = DispatcherConfig::new("child", 4, 4);
        child.parent = Some("root".to_string());
        let topology = TopologyConfig {
            dispatchers: vec![child, DispatcherConfig::new("root", 4, 4)],
        };
        assert_eq!(topology.parent_first_order(), Some(vec!["root", "child"]));
    }

    #[test]
    fn test_parent_cycle_has_no_order() {
        let mut a = DispatcherConfig::new("a", 4, 4);
        a.parent = Some("b".to_string());
        let mut b = DispatcherConfig::new("b", 4, 4);
        b.parent = Some("a".to_string());
        let topology = TopologyConfig {
            dispatchers: vec![a, b],
        };
        assert!(topology.parent_first_order().is_none());
    }
}
