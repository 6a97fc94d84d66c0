//! Topology file parsing
//!
//! TOML is the primary format, JSON is accepted as well.

use contracts::{ContractError, TopologyConfig};

/// Topology file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Infer the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_toml(content: &str) -> Result<TopologyConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse_json(content: &str) -> Result<TopologyConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<TopologyConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_applies_defaults() {
        let content = r#"
[[dispatchers]]
name = "can"
element_size = 8

[[dispatchers]]
name = "gateway"
ring_capacity = 32
element_size = 8
queue_capacity = 64
max_handlers = 4
parent = "can"

[dispatchers.worker]
name = "gw-thread"
stack_size = 65536
priority = 3
"#;
        let topology = parse_toml(content).unwrap();
        assert_eq!(topology.dispatchers.len(), 2);

        let can = topology.get("can").unwrap();
        assert_eq!(can.ring_capacity, contracts::DEFAULT_RING_CAPACITY);
        assert_eq!(can.max_handlers, contracts::DEFAULT_MAX_HANDLERS);
        assert!(can.parent.is_none());

        let gateway = topology.get("gateway").unwrap();
        assert_eq!(gateway.effective_queue_capacity(), 64);
        assert_eq!(gateway.parent.as_deref(), Some("can"));
        assert_eq!(gateway.worker_name(), "gw-thread");
        // legacy key name is still accepted
        assert_eq!(gateway.worker.priority_hint, 3);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "dispatchers": [
                { "name": "root", "element_size": 4 },
                { "name": "leaf", "element_size": 4, "parent": "root" }
            ]
        }"#;
        let topology = parse_json(content).unwrap();
        assert_eq!(topology.parent_first_order(), Some(vec!["root", "leaf"]));
    }

    #[test]
    fn test_worker_priority_hint_key() {
        let content = r#"{
            "dispatchers": [
                { "name": "root", "element_size": 4, "worker": { "priority_hint": 5 } },
                { "name": "leaf", "element_size": 4, "parent": "root" }
            ]
        }"#;
        let topology = parse_json(content).unwrap();
        assert_eq!(topology.get("root").unwrap().worker.priority_hint, 5);
        assert_eq!(topology.get("leaf").unwrap().worker.priority_hint, 1);

        let json = serde_json::to_string(&topology).unwrap();
        assert!(json.contains("\"priority_hint\":5"));
    }

    #[test]
    fn test_missing_element_size_is_parse_error() {
        let content = r#"
[[dispatchers]]
name = "can"
"#;
        assert!(matches!(
            parse_toml(content),
            Err(ContractError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let err = parse_toml("invalid toml [[[").unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("toml"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("JSON"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
