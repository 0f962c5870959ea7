//! Server configuration

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use starfall_protocol::RoomConfig;

/// Server configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Scheduler poll interval
    pub tick_interval_ms: u64,
    /// Minimum time a room stays in resolving before it is finalized
    pub finalize_delay_ms: u64,
    /// Maximum live rooms in this process
    pub max_rooms: usize,
    /// Length of generated room codes
    pub room_code_len: usize,
    /// Settings used when a create request carries none
    pub default_room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            finalize_delay_ms: 3_000,
            max_rooms: 256,
            room_code_len: 6,
            default_room: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from a YAML file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        starfall_core::room::validate_config(&config.default_room)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starfall_protocol::MapSize;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ServerConfig::from_yaml(
            "finalize_delay_ms: 500\ndefault_room:\n  map_size: large\n  max_players: 6\n",
        )
        .unwrap();

        assert_eq!(config.finalize_delay_ms, 500);
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.default_room.map_size, MapSize::Large);
        assert_eq!(config.default_room.max_players, 6);
        assert_eq!(config.default_room.max_turns, 30);
    }

    #[test]
    fn invalid_default_room_is_rejected() {
        assert!(ServerConfig::from_yaml("default_room:\n  max_players: 12\n").is_err());
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(ServerConfig::from_yaml("{}").unwrap(), ServerConfig::default());
    }
}
