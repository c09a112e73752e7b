//! Configuration management for gearstat.
//!
//! Configuration is loaded from `~/.config/gearstat/config.toml`.

use crate::client::Limits;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Job server to query.
    #[serde(default)]
    pub server: ServerConfig,
    /// Line bounds and tokenization.
    #[serde(default)]
    pub protocol: Limits,
}

/// Where the admin port lives and how long to wait on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname (default: localhost).
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Admin port (default: 4730).
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Per-receive timeout; 0 waits forever.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    4730
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_read_timeout() -> u64 {
    10
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("gearstat"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, using defaults if not found.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{SplitMode, WorkerMarker};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.address(), "localhost:4730");
        assert_eq!(config.server.read_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.protocol.split_mode, SplitMode::Strict);
        assert_eq!(config.protocol.worker_marker, WorkerMarker::Keep);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
[server]
hostname = "gearman.internal"
read_timeout_secs = 0

[protocol]
max_line_len = 128
split_mode = "skip-empty"
worker_marker = "skip-colon"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "gearman.internal");
        assert_eq!(config.server.port, 4730);
        assert_eq!(config.server.read_timeout(), None);
        assert_eq!(config.protocol.max_line_len, 128);
        assert_eq!(config.protocol.max_version_len, 64);
        assert_eq!(config.protocol.split_mode, SplitMode::SkipEmpty);
        assert_eq!(config.protocol.worker_marker, WorkerMarker::SkipColon);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_serialization() {
        let toml = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(toml.contains("port = 4730"));
        assert!(toml.contains("split_mode = \"strict\""));
        assert!(toml.contains("worker_marker = \"keep\""));
    }
}
