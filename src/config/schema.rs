//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use super::error::{ConfigError, ConfigResult};
use crate::port::{MessageFilter, DEFAULT_CLIENT_NAME};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Driver configuration
    pub driver: DriverConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values that serde accepts but the driver can't use.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.driver.client_name.trim().is_empty() {
            return Err(ConfigError::validation(
                "driver.client_name",
                "must not be empty",
            ));
        }
        if let Some((alias, _)) = self
            .driver
            .port_aliases
            .iter()
            .find(|(_, target)| target.trim().is_empty())
        {
            return Err(ConfigError::validation(
                format!("driver.port_aliases.{}", alias),
                "alias target must not be empty",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::validation("logging.level", "must not be empty"));
        }
        Ok(())
    }
}

/// Driver configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Client name the native layer shows for opened ports
    pub client_name: String,
    /// Inbound message classes the midir backend drops
    pub ignore: MessageFilter,
    /// Port aliases for lookup by name
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            ignore: MessageFilter::None,
            port_aliases: HashMap::new(),
        }
    }
}

impl DriverConfig {
    /// Resolve a port query through aliases
    pub fn resolve_port<'a>(&'a self, query: &'a str) -> &'a str {
        self.port_aliases
            .get(query)
            .map(String::as_str)
            .unwrap_or(query)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. "info" or "midi_port_driver=debug"
    pub level: String,
    /// Log format: "pretty", "compact", "full"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line format with colors
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
    /// Default single-line format with all fields
    Full,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "full" => Ok(Self::Full),
            other => Err(format!(
                "unknown log format '{}', expected pretty, compact or full",
                other
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Full => "full",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.driver.client_name, DEFAULT_CLIENT_NAME);
        assert_eq!(config.driver.ignore, MessageFilter::None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_alias_resolution() {
        let mut config = DriverConfig::default();
        config
            .port_aliases
            .insert("keys".to_string(), "Keystation".to_string());

        assert_eq!(config.resolve_port("keys"), "Keystation");
        assert_eq!(config.resolve_port("Synth"), "Synth");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[driver]"));
        assert!(toml_str.contains("[logging]"));
        assert!(toml_str.contains("format = \"compact\""));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [driver]
            client_name = "studio"
            ignore = "active_sense"

            [driver.port_aliases]
            keys = "Keystation"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.driver.client_name, "studio");
        assert_eq!(config.driver.ignore, MessageFilter::ActiveSense);
        assert_eq!(config.driver.resolve_port("keys"), "Keystation");
        // Defaults should still work
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_rejects_empty_client_name() {
        let mut config = Config::default();
        config.driver.client_name = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("driver.client_name"));
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("Pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert_eq!("full".parse::<LogFormat>(), Ok(LogFormat::Full));
        assert!("json".parse::<LogFormat>().is_err());
    }
}
