// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0

// Server Configuration
//
// Where the alias server publishes its entry points and where it keeps its
// cache file. Sources, lowest precedence first:
// - built-in defaults
// - YAML file (explicit path, ALIASD_CONFIG_PATH, ./aliasd.yaml)
// - ALIASD_PREFIX / ALIASD_CACHE_FILE environment variables
// - command line flags (applied by the CLI)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PREFIX: &str = "meta/alias/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Path prefix of the `add`, `remove`, `aliases` and `error` entries.
    pub prefix: String,

    /// JSON file holding the alias set across restarts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            cache_file: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. ALIASD_CONFIG_PATH environment variable
    /// 2. ./aliasd.yaml (working directory)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ALIASD_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aliasd.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", path);
                Self::from_yaml_file(path)?
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(prefix) = std::env::var("ALIASD_PREFIX") {
            tracing::info!("Environment override: ALIASD_PREFIX={}", prefix);
            self.prefix = prefix;
        }
        if let Ok(path) = std::env::var("ALIASD_CACHE_FILE") {
            tracing::info!("Environment override: ALIASD_CACHE_FILE={}", path);
            self.cache_file = if path.is_empty() { None } else { Some(PathBuf::from(path)) };
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.prefix.is_empty() {
            anyhow::bail!("Invalid prefix: must not be empty");
        }
        if !self.prefix.ends_with('/') {
            anyhow::bail!("Invalid prefix: '{}' must end with '/'", self.prefix);
        }
        Ok(())
    }

    pub fn add_path(&self) -> String {
        format!("{}add", self.prefix)
    }

    pub fn remove_path(&self) -> String {
        format!("{}remove", self.prefix)
    }

    pub fn aliases_path(&self) -> String {
        format!("{}aliases", self.prefix)
    }

    pub fn error_path(&self) -> String {
        format!("{}error", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.add_path(), "meta/alias/add");
        assert_eq!(config.remove_path(), "meta/alias/remove");
        assert_eq!(config.aliases_path(), "meta/alias/aliases");
        assert_eq!(config.error_path(), "meta/alias/error");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let config = ServerConfig::from_yaml_str("cache_file: /var/lib/aliasd/aliases.json\n").unwrap();
        assert_eq!(config.prefix, DEFAULT_PREFIX);
        assert_eq!(config.cache_file, Some(PathBuf::from("/var/lib/aliasd/aliases.json")));

        let config = ServerConfig::from_yaml_str("prefix: sys/alias/\n").unwrap();
        assert_eq!(config.aliases_path(), "sys/alias/aliases");
        assert_eq!(config.cache_file, None);
    }

    #[test]
    fn test_validate_prefix() {
        let mut config = ServerConfig::default();
        config.prefix = "meta/alias".to_string();
        assert!(config.validate().is_err());
        config.prefix = String::new();
        assert!(config.validate().is_err());
    }
}
