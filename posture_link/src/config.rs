// THEORY:
// The daemon's config file has two tables: `[engine]` is handed to the posture
// engine unchanged, `[link]` describes how the device talks to the outside world.
// Either may be omitted.
//
//   [engine]
//   cycle_secs = 0.3
//   [engine.thresholds.trunk]
//   acceptable = 0.1
//   warning = 0.2
//
//   [link]
//   bind_addr = "0.0.0.0:3001"
//   alert_url = "http://backend.local/alerts"

use std::path::Path;

use posture_vision::{ConfigError, EngineConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3001";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub bind_addr: String,
    /// Alerts are only logged when unset.
    pub alert_url: Option<String>,
    /// Updates buffered per WebSocket client before it starts skipping.
    pub broadcast_capacity: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            alert_url: None,
            broadcast_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub engine: EngineConfig,
    pub link: LinkSettings,
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: DaemonConfig = toml::from_str(text)?;
        config.engine.validate()?;
        Ok(config)
    }
}
