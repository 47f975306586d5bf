//! Device configuration
//!
//! Tunable parameters for a Hearth node, loadable from a JSON document
//! (flashed alongside the firmware or pushed over provisioning).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Configuration validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Device name is empty or whitespace-only.
    EmptyName,
    /// An interval was set to zero where a real period is required.
    ZeroInterval(&'static str),
    /// The document failed to parse as JSON.
    Malformed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "device name must not be empty"),
            Self::ZeroInterval(field) => write!(f, "{field} must be greater than zero"),
            Self::Malformed => write!(f, "configuration document is not valid JSON"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Core device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Friendly device name; the machine id is derived from this.
    pub name: String,

    // --- Timing ---
    /// Main loop pacing (milliseconds). How often the orchestrator is
    /// expected to call `run_loop`.
    pub loop_interval_ms: u32,
    /// Default cadence for polling components that don't specify one
    /// (milliseconds).
    pub default_update_interval_ms: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "hearth-node".to_string(),
            loop_interval_ms: 16,              // ~60 Hz
            default_update_interval_ms: 15_000, // 15 s
        }
    }
}

impl DeviceConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(doc: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(doc).map_err(|_| ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.loop_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("loop_interval_ms"));
        }
        if self.default_update_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("default_update_interval_ms"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = DeviceConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.name, "hearth-node");
        assert!(c.loop_interval_ms > 0);
        assert!(c.default_update_interval_ms > 0);
    }

    #[test]
    fn json_roundtrip_preserves_fields() {
        let c = DeviceConfig {
            name: "Livingroom Node".to_string(),
            loop_interval_ms: 20,
            default_update_interval_ms: 5000,
        };
        let doc = serde_json::to_string(&c).unwrap();
        let back = DeviceConfig::from_json(&doc).unwrap();
        assert_eq!(back.name, "Livingroom Node");
        assert_eq!(back.loop_interval_ms, 20);
        assert_eq!(back.default_update_interval_ms, 5000);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let c = DeviceConfig::from_json(r#"{"name": "Bedroom"}"#).unwrap();
        assert_eq!(c.name, "Bedroom");
        assert_eq!(c.loop_interval_ms, DeviceConfig::default().loop_interval_ms);
    }

    #[test]
    fn empty_name_is_rejected() {
        let c = DeviceConfig {
            name: "   ".to_string(),
            ..DeviceConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::EmptyName));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let c = DeviceConfig {
            loop_interval_ms: 0,
            ..DeviceConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::ZeroInterval("loop_interval_ms")));
    }

    #[test]
    fn garbage_document_is_malformed() {
        assert_eq!(
            DeviceConfig::from_json("not json").unwrap_err(),
            ConfigError::Malformed
        );
    }
}
