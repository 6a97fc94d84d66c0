//! # Config Loader
//!
//! Loads a dispatcher topology from TOML or JSON.
//!
//! Responsibilities:
//! - Parse TOML/JSON topology files
//! - Validate field ranges and parent links
//! - Produce a [`TopologyConfig`]
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let topology = ConfigLoader::load_from_path(Path::new("topology.toml")).unwrap();
//! for name in topology.parent_first_order().unwrap() {
//!     println!("{name}");
//! }
//! ```

mod parser;
mod validator;

pub use contracts::TopologyConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;
use tracing::info;

/// Topology loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a topology file, picking the format from the extension (.toml / .json)
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<TopologyConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let topology = Self::load_from_str(&content, format)?;
        info!(
            path = %path.display(),
            dispatchers = topology.dispatchers.len(),
            "Topology loaded"
        );
        Ok(topology)
    }

    /// Parse and validate a topology held in memory
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<TopologyConfig, ContractError> {
        let topology = parser::parse(content, format)?;
        validator::validate(&topology)?;
        Ok(topology)
    }

    /// Validate a topology built in code
    pub fn validate(topology: &TopologyConfig) -> Result<(), ContractError> {
        validator::validate(topology)
    }

    pub fn to_toml(topology: &TopologyConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(topology)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(topology: &TopologyConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(topology)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }

    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOPOLOGY_TOML: &str = r#"
[[dispatchers]]
name = "vehicle"
ring_capacity = 16
element_size = 8

[[dispatchers]]
name = "can0"
ring_capacity = 8
element_size = 8
max_handlers = 4
parent = "vehicle"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let topology = ConfigLoader::load_from_str(TOPOLOGY_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(topology.dispatchers.len(), 2);
        assert_eq!(topology.get("can0").unwrap().max_handlers, 4);
    }

    #[test]
    fn test_round_trip_toml() {
        let topology = ConfigLoader::load_from_str(TOPOLOGY_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&topology).unwrap();
        let again = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(topology, again);
    }

    #[test]
    fn test_round_trip_json() {
        let topology = ConfigLoader::load_from_str(TOPOLOGY_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&topology).unwrap();
        let again = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(topology, again);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[[dispatchers]]
name = "a"
element_size = 4
parent = "b"

[[dispatchers]]
name = "b"
element_size = 4
parent = "a"
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("cycle"), "got: {err}");
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(TOPOLOGY_TOML.as_bytes()).unwrap();
        let topology = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(topology.parent_first_order(), Some(vec!["vehicle", "can0"]));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported"), "got: {err}");
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_from_path(Path::new("/nonexistent/topology.toml")).unwrap_err();
        assert!(matches!(err, ContractError::Io(_)));
    }
}
