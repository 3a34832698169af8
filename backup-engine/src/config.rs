//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file; every field has a default so an
//! empty file (or no file) yields a working regtest configuration.

use crate::registry::Network;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Network namespace this engine instance backs up under. Each network
    /// is an independent backup space beneath the same identity.
    #[serde(default = "default_network")]
    pub network: Network,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Current backup store endpoint
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Legacy backup store endpoint, probed during restore only.
    /// Absent means no legacy fallback.
    #[serde(default)]
    pub legacy_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiescence window: rapid repeated dirty-marks within this window
    /// collapse into one upload
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,

    /// Periodic re-check of all still-dirty categories
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// How long a category may stay continuously dirty before a user-visible
    /// warning is emitted
    #[serde(default = "default_escalation_threshold_secs")]
    pub escalation_threshold_secs: u64,

    /// Minimum gap between repeated warnings for the same category
    #[serde(default = "default_warning_repeat_secs")]
    pub warning_repeat_secs: u64,

    /// Timeout applied to every transport call
    #[serde(default = "default_transport_timeout_secs")]
    pub transport_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_network() -> Network {
    Network::Mainnet
}

fn default_server_url() -> String {
    "https://backups.blocktank.to".to_string()
}

fn default_debounce_secs() -> u64 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_escalation_threshold_secs() -> u64 {
    30 * 60
}

fn default_warning_repeat_secs() -> u64 {
    10 * 60
}

fn default_transport_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            network: default_network(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            url: default_server_url(),
            legacy_url: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            debounce_secs: default_debounce_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            escalation_threshold_secs: default_escalation_threshold_secs(),
            warning_repeat_secs: default_warning_repeat_secs(),
            transport_timeout_secs: default_transport_timeout_secs(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineConfig::default(),
            server: ServerConfig::default(),
            sync: SyncConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn escalation_threshold(&self) -> Duration {
        Duration::from_secs(self.escalation_threshold_secs)
    }

    pub fn warning_repeat(&self) -> Duration {
        Duration::from_secs(self.warning_repeat_secs)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.network, Network::Mainnet);
        assert_eq!(config.sync.debounce_secs, 5);
        assert_eq!(config.sync.sweep_interval_secs, 60);
        assert_eq!(config.sync.escalation_threshold_secs, 1800);
        assert_eq!(config.sync.warning_repeat_secs, 600);
        assert!(config.server.legacy_url.is_none());
    }

    #[test]
    fn test_from_file_partial_override() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"
            [engine]
            network = "regtest"

            [server]
            url = "http://localhost:8080"
            legacy_url = "http://localhost:8081"

            [sync]
            debounce_secs = 1
            "#
        )?;

        let config = Config::from_file(&file.path().to_path_buf())?;
        assert_eq!(config.engine.network, Network::Regtest);
        assert_eq!(config.server.url, "http://localhost:8080");
        assert_eq!(
            config.server.legacy_url.as_deref(),
            Some("http://localhost:8081")
        );
        assert_eq!(config.sync.debounce_secs, 1);
        // Untouched sections fall back to defaults
        assert_eq!(config.sync.sweep_interval_secs, 60);
        assert_eq!(config.log.level, "info");
        Ok(())
    }
}
