//! Universe construction settings.
//!
//! Capacities are reservations only: every table still grows on demand.
//! Settings can be embedded in a host's JSON config:
//!
//! ```json
//! { "reserved_entities": 20000, "reserved_hierarchy_nodes": 1024 }
//! ```
//!
//! Missing keys fall back to [`UniverseConfig::default`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    /// Slots reserved up front in the entity and transform tables.
    pub reserved_entities: usize,
    /// Nodes reserved in the hierarchy table.
    pub reserved_hierarchy_nodes: usize,
    /// Entries reserved in the name table.
    pub reserved_names: usize,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            reserved_entities: 5000,
            reserved_hierarchy_nodes: 256,
            reserved_names: 256,
        }
    }
}

impl UniverseConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::debug!("Loaded universe config from '{}': {config:?}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = UniverseConfig::from_json_str(r#"{ "reserved_entities": 16 }"#).unwrap();
        assert_eq!(config.reserved_entities, 16);
        assert_eq!(config.reserved_names, UniverseConfig::default().reserved_names);
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(UniverseConfig::from_json_str("{ reserved_entities: ").is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = UniverseConfig::load("/nonexistent/orrery/universe.json").unwrap_err();
        assert!(matches!(err, crate::error::UniverseError::ConfigIo(_)));
    }
}
