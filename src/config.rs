//! Configuration Management
//!
//! Provides functionality for:
//! - Loading/saving the node configuration as YAML
//! - Default configuration
//! - Validation of registry bounds

use crate::error::TnsError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Cluster-unique node id, defaults to the startup wall time in ms
    #[serde(default = "default_node_id")]
    pub id: u64,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_version")]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Seconds between gossip rounds
    #[serde(default = "default_gossip_interval")]
    pub interval_secs: u64,
    /// Peers to meet at startup (`host:port`)
    #[serde(default)]
    pub seeds: Vec<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Minimum seconds an entity dwells in each departure state
    #[serde(default = "default_tombstone_dwell")]
    pub tombstone_dwell_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_min_ping")]
    pub min_ping_secs: u32,
    #[serde(default = "default_max_ping")]
    pub max_ping_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for rolling JSON log files
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    /// Number of log files to keep
    #[serde(default = "default_log_files")]
    pub files_to_keep: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub gossip: GossipConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            host: default_host(),
            port: default_port(),
            version: default_version(),
        }
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_gossip_interval(),
            seeds: Vec::new(),
            connect_timeout_ms: default_connect_timeout(),
            io_timeout_ms: default_io_timeout(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tombstone_dwell_secs: default_tombstone_dwell(),
            sweep_interval_secs: default_sweep_interval(),
            min_ping_secs: default_min_ping(),
            max_ping_secs: default_max_ping(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            files_to_keep: default_log_files(),
        }
    }
}

fn default_node_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(1)
}
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8700 }
fn default_version() -> String { env!("CARGO_PKG_VERSION").to_string() }
fn default_gossip_interval() -> u64 { 5 }
fn default_connect_timeout() -> u64 { 2000 }
fn default_io_timeout() -> u64 { 2000 }
fn default_tombstone_dwell() -> u64 { 60 }
fn default_sweep_interval() -> u64 { 10 }
fn default_min_ping() -> u32 { 10 }
fn default_max_ping() -> u32 { 60 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_dir() -> PathBuf { PathBuf::from("logs") }
fn default_log_files() -> usize { 7 }

impl GossipConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl RegistryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Clamps a requested ping frequency into the configured bounds.
    pub fn clamp_ping(&self, ping_secs: u32) -> u32 {
        ping_secs.max(self.min_ping_secs).min(self.max_ping_secs)
    }
}

impl Config {
    /// Load configuration from file, writing the defaults when it is missing
    pub fn load(path: &Path) -> Result<Self, TnsError> {
        if !path.exists() {
            debug!("Configuration file not found at {:?}, creating default", path);
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| TnsError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| TnsError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file atomically
    pub fn save(&self, path: &Path) -> Result<(), TnsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    TnsError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }
        let yaml = serde_yaml::to_string(&self)
            .map_err(|e| TnsError::Config(format!("Failed to serialize config: {}", e)))?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, yaml)
            .map_err(|e| TnsError::Config(format!("Failed to write config: {}", e)))?;
        fs::rename(&temp_path, path)
            .map_err(|e| TnsError::Config(format!("Failed to save config: {}", e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TnsError> {
        if self.registry.min_ping_secs > self.registry.max_ping_secs {
            return Err(TnsError::Config(format!(
                "min_ping_secs ({}) exceeds max_ping_secs ({})",
                self.registry.min_ping_secs, self.registry.max_ping_secs
            )));
        }
        if self.node.id == 0 {
            return Err(TnsError::Config("node id must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Get configuration file path
    pub fn get_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tns")
            .join("config.yml")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.node.host, self.node.port)
    }
}
