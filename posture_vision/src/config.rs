// THEORY:
// `EngineConfig` is everything the engine needs to know before the first frame:
// how often to run, how hard to smooth, when to alert, and where the thresholds
// start. Every field has a default so an empty TOML file is a valid config, and
// `validate()` is the single gate every source of configuration passes through
// (file, CLI overrides, tests).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core_modules::alert::AlertSettings;
use crate::core_modules::classifier::ThresholdSet;
use crate::core_modules::smoother::DEFAULT_SMOOTHING_FACTOR;
use crate::error::ConfigError;

pub const DEFAULT_CYCLE_SECS: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pipeline cycle length in seconds.
    pub cycle_secs: f64,
    /// EMA weight of the newest curvature sample.
    pub smoothing_alpha: f64,
    pub alert: AlertSettings,
    pub thresholds: ThresholdSet,
    /// Fixed device identifier. When unset, the first inbound message that carries one wins.
    pub device_id: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_secs: DEFAULT_CYCLE_SECS,
            smoothing_alpha: DEFAULT_SMOOTHING_FACTOR,
            alert: AlertSettings::default(),
            thresholds: ThresholdSet::default(),
            device_id: None,
        }
    }
}

impl EngineConfig {
    /// Reads and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cycle_secs.is_finite() && self.cycle_secs > 0.0) {
            return Err(ConfigError::InvalidSetting {
                name: "cycle_secs",
                detail: format!("must be a positive number of seconds, got {}", self.cycle_secs),
            });
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(ConfigError::InvalidSetting {
                name: "smoothing_alpha",
                detail: format!("must be in (0, 1], got {}", self.smoothing_alpha),
            });
        }
        let rates = [
            ("alert.increase_rate", self.alert.increase_rate),
            ("alert.decrease_rate", self.alert.decrease_rate),
            ("alert.threshold", self.alert.threshold),
        ];
        for (name, value) in rates {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidSetting {
                    name,
                    detail: format!("must be a non-negative number, got {value}"),
                });
            }
        }
        self.thresholds.validate()
    }

    pub fn cycle(&self) -> Duration {
        Duration::from_secs_f64(self.cycle_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::alert::BadPosturePolicy;
    use std::io::Write;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cycle(), Duration::from_millis(300));
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            cycle_secs = 0.5
            device_id = "desk-1"

            [alert]
            policy = "meh"

            [thresholds.trunk]
            acceptable = 0.12
            warning = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.cycle_secs, 0.5);
        assert_eq!(config.device_id.as_deref(), Some("desk-1"));
        assert_eq!(config.alert.policy, BadPosturePolicy::Meh);
        assert_eq!(config.alert.increase_rate, 0.1);
        assert_eq!(config.thresholds.trunk.acceptable, 0.12);
        assert_eq!(config.thresholds.arm, ThresholdSet::default().arm);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let err = EngineConfig::from_toml_str(
            r#"
            [thresholds.neck]
            acceptable = 30.0
            warning = 20.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent { segment: "neck", .. }));
    }

    #[test]
    fn zero_cycle_is_rejected() {
        let err = EngineConfig::from_toml_str("cycle_secs = 0.0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { name: "cycle_secs", .. }));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "smoothing_alpha = 0.25").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.smoothing_alpha, 0.25);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::load("/nonexistent/posture.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/posture.toml"));
    }
}
