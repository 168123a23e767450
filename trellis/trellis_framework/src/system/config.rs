//! Configuration for the Trellis framework
//!
//! Handles loading and merging framework configuration.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use trellis_core::types::PropertyValue;
use trellis_core::utils::LogLevel;

/// Errors that can occur in configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Framework configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Minimum severity kept by the diagnostics collaborator
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Launch properties, readable through every bundle context
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,

    /// Whether shutdown stops the installed bundles
    #[serde(default = "default_stop_bundles_on_shutdown")]
    pub stop_bundles_on_shutdown: bool,

    /// Symbolic name of the system bundle
    #[serde(default = "default_system_bundle_name")]
    pub system_bundle_name: String,
}

fn default_log_level() -> LogLevel {
    LogLevel::Debug
}

fn default_stop_bundles_on_shutdown() -> bool {
    true
}

fn default_system_bundle_name() -> String {
    "system.bundle".to_string()
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            properties: HashMap::new(),
            stop_bundles_on_shutdown: default_stop_bundles_on_shutdown(),
            system_bundle_name: default_system_bundle_name(),
        }
    }
}

impl FrameworkConfig {
    /// Load configuration from a JSON file, falling back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = FrameworkConfig::default();

        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());

            if !path.exists() {
                warn!("Configuration file not found: {}", path.display());
                return Ok(config);
            }

            let content = std::fs::read_to_string(path)
                .context(format!("Failed to read configuration file: {}", path.display()))?;

            config = serde_json::from_str(&content)
                .context(format!("Failed to parse configuration file: {}", path.display()))?;
        } else {
            info!("No configuration file specified, using defaults");
        }

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(content: &str) -> std::result::Result<Self, ConfigError> {
        let config: FrameworkConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.system_bundle_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "System bundle name cannot be empty".to_string(),
            ));
        }

        if let Some(key) = self.properties.keys().find(|k| k.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "Property keys cannot be empty (found {:?})",
                key
            )));
        }

        Ok(())
    }

    /// Merge with another configuration
    ///
    /// Values in `other` that differ from the defaults win; properties are
    /// overlaid key by key.
    pub fn merge(&mut self, other: FrameworkConfig) {
        if other.log_level != default_log_level() {
            self.log_level = other.log_level;
        }

        for (key, value) in other.properties {
            self.properties.insert(key, value);
        }

        if !other.stop_bundles_on_shutdown {
            self.stop_bundles_on_shutdown = false;
        }

        if !other.system_bundle_name.is_empty()
            && other.system_bundle_name != default_system_bundle_name()
        {
            self.system_bundle_name = other.system_bundle_name;
        }
    }

    /// Builder-style launch property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Builder-style log level
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let file = NamedTempFile::new().unwrap();

        let config_json = r#"
        {
            "log_level": "warning",
            "stop_bundles_on_shutdown": false,
            "properties": {
                "org.example.port": 8080,
                "org.example.name": "edge",
                "org.example.tags": ["a", "b"]
            }
        }
        "#;

        std::fs::write(file.path(), config_json).unwrap();

        let config = FrameworkConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.log_level, LogLevel::Warning);
        assert!(!config.stop_bundles_on_shutdown);
        assert_eq!(config.system_bundle_name, "system.bundle");
        assert_eq!(
            config.properties.get("org.example.port"),
            Some(&PropertyValue::Integer(8080))
        );
        assert_eq!(
            config.properties.get("org.example.name"),
            Some(&PropertyValue::String("edge".into()))
        );
        assert!(config.properties["org.example.tags"].is_list());
    }

    #[test]
    fn test_default_config() {
        let config = FrameworkConfig::load(None).unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.stop_bundles_on_shutdown);
        assert_eq!(config.system_bundle_name, "system.bundle");
        assert!(config.properties.is_empty());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let config = FrameworkConfig::load(Some(&path)).unwrap();
        assert_eq!(config.system_bundle_name, "system.bundle");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{ not json").unwrap();

        let error = FrameworkConfig::load(Some(file.path())).unwrap_err();
        assert!(error.to_string().contains("Failed to parse configuration file"));
    }

    #[test]
    fn test_validate_rejects_empty_system_bundle_name() {
        let result = FrameworkConfig::from_json(r#"{ "system_bundle_name": "  " }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = FrameworkConfig::from_json(r#"{ "log_level": "loud" }"#);
        assert!(matches!(result, Err(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn test_merge_config() {
        let mut base = FrameworkConfig::default().with_property("a", 1);

        let override_config = FrameworkConfig {
            log_level: LogLevel::Error,
            stop_bundles_on_shutdown: false,
            system_bundle_name: "edge.system".to_string(),
            ..FrameworkConfig::default()
        }
        .with_property("a", 2)
        .with_property("b", "two");

        base.merge(override_config);

        assert_eq!(base.log_level, LogLevel::Error);
        assert!(!base.stop_bundles_on_shutdown);
        assert_eq!(base.system_bundle_name, "edge.system");
        assert_eq!(base.properties.get("a"), Some(&PropertyValue::Integer(2)));
        assert_eq!(base.properties.len(), 2);
    }
}
