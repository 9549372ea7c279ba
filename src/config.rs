//! Service configuration
//!
//! One TOML file describes the broker connection and the set of vacuums to
//! ingest. Broker credentials are indirected through environment variables
//! so the file itself carries no secrets.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub mqtt: MqttSection,
    #[serde(default)]
    pub vacuums: Vec<VacuumSection>,
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL with scheme and optional port (`mqtt://` or `mqtts://`).
    pub broker_url: String,
    /// Environment variable containing the broker username.
    pub username_env: Option<String>,
    /// Environment variable containing the broker password.
    pub password_env: Option<String>,
}

/// One vacuum to ingest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VacuumSection {
    /// Short name used for logging and client ids (must match [a-zA-Z0-9._-]+).
    pub name: String,
    /// Host entity identifier.
    pub entity_id: String,
    /// Host device identifier.
    pub device_id: String,
    /// MQTT base topic the vacuum publishes under.
    pub base_topic: String,
    /// Software version reported by the device; drives firmware classification.
    pub software_version: String,
    /// Seconds between refresh ticks.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval() -> u64 {
    3
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid vacuum name: {0}")]
    InvalidVacuumName(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServiceConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate name format, base topics, and uniqueness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for vacuum in &self.vacuums {
            validate_vacuum_name(&vacuum.name)?;
            if vacuum.base_topic.trim_matches('/').is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "vacuum '{}' has an empty base_topic",
                    vacuum.name
                )));
            }
        }

        let mut names: Vec<&str> = self.vacuums.iter().map(|v| v.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.vacuums.len() {
            return Err(ConfigError::InvalidConfig(
                "vacuum names must be unique".to_string(),
            ));
        }

        Ok(())
    }

    /// Broker username from the configured environment variable.
    pub fn mqtt_username(&self) -> Option<String> {
        env_var_optional(self.mqtt.username_env.as_ref())
    }

    /// Broker password from the configured environment variable.
    pub fn mqtt_password(&self) -> Option<String> {
        env_var_optional(self.mqtt.password_env.as_ref())
    }
}

fn env_var_optional(env_var_name: Option<&String>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}

fn validate_vacuum_name(name: &str) -> Result<(), ConfigError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if name.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidVacuumName(format!(
            "Vacuum name '{name}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_content: &str) -> ServiceConfig {
        toml::from_str(toml_content).expect("config should parse")
    }

    const VALID_CONFIG: &str = r#"
[mqtt]
broker_url = "mqtt://localhost:1883"

[[vacuums]]
name = "tango"
entity_id = "vacuum.tango"
device_id = "dev-tango"
base_topic = "valetudo/tango"
software_version = "Valetudo 2024.1"

[[vacuums]]
name = "legacy"
entity_id = "vacuum.legacy"
device_id = "dev-legacy"
base_topic = "rand256/legacy"
software_version = "1.2.3-custom"
refresh_interval_secs = 10
"#;

    #[test]
    fn valid_config_parses_and_validates() {
        let config = parse(VALID_CONFIG);
        assert!(config.validate().is_ok());
        assert_eq!(config.vacuums.len(), 2);
        assert_eq!(config.vacuums[0].refresh_interval_secs, 3);
        assert_eq!(config.vacuums[1].refresh_interval_secs, 10);
    }

    #[test]
    fn invalid_vacuum_name_is_rejected() {
        let mut config = parse(VALID_CONFIG);
        config.vacuums[0].name = "tango robot".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidVacuumName(_))
        ));
    }

    #[test]
    fn empty_base_topic_is_rejected() {
        let mut config = parse(VALID_CONFIG);
        config.vacuums[0].base_topic = "/".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut config = parse(VALID_CONFIG);
        config.vacuums[1].name = "tango".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_credentials_envs_yield_none() {
        let config = parse(VALID_CONFIG);
        assert_eq!(config.mqtt_username(), None);
        assert_eq!(config.mqtt_password(), None);
    }
}
