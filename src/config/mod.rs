//! # Configuration Management Module
//!
//! Gateway settings live in one TOML file (default `config.toml`). Every section
//! has defaults, so a minimal file only needs the node callsign and serial port.
//!
//! ## Configuration Structure
//!
//! - [`NodeConfig`] - identity of the local node
//! - [`SerialConfig`] - device port settings
//! - [`DatabaseConfig`] - frame store location
//! - [`RelayConfig`] - UDP relay listener
//! - [`LoggingConfig`] - log level and optional log file
//! - [`StatsConfig`] - periodic counter logging
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshcom_gateway::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Callsign: {}", config.node.callsign);
//!     println!("Serial Port: {}", config.serial.port);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [node]
//! callsign = "IK5XMK-98"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! timeout_secs = 1
//!
//! [database]
//! path = "meshcom.db"
//!
//! [relay]
//! enabled = true
//! bind_address = "0.0.0.0"
//! port = 1703
//! prefix = "MSG_OUT:"
//! marker = "::"
//!
//! [logging]
//! level = "info"
//! file = "meshcom-gateway.log"
//!
//! [stats]
//! interval_secs = 300
//! ```

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Callsign stamped as `src` on frames the device reports without one
    /// (typically our own outgoing traffic).
    pub callsign: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout; bounds how long the gateway loop blocks without data.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_timeout_secs() -> u64 {
    1
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: default_baud_rate(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; relative paths resolve against the working directory.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "meshcom.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// Datagrams must start with this to be relayed
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Prepended to the relayed body on the serial line
    #[serde(default = "default_marker")]
    pub marker: String,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_relay_port() -> u16 {
    1703
}

fn default_prefix() -> String {
    "MSG_OUT:".to_string()
}

fn default_marker() -> String {
    "::".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            port: default_relay_port(),
            prefix: default_prefix(),
            marker: default_marker(),
        }
    }
}

impl RelayConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Seconds between counter log lines; 0 disables them.
    #[serde(default = "default_stats_interval")]
    pub interval_secs: u64,
}

fn default_stats_interval() -> u64 {
    300
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stats_interval(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;
        let config = Self::from_toml(&content)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path, e))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;
        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.callsign.trim().is_empty() {
            bail!("node.callsign must not be empty");
        }
        if self.serial.port.trim().is_empty() {
            bail!("serial.port must not be empty");
        }
        if self.serial.baud_rate == 0 {
            bail!("serial.baud_rate must be greater than zero");
        }
        if self.serial.timeout_secs == 0 {
            bail!("serial.timeout_secs must be at least 1");
        }
        if self.database.path.trim().is_empty() {
            bail!("database.path must not be empty");
        }
        if self.relay.prefix.is_empty() {
            bail!("relay.prefix must not be empty");
        }
        if self.relay.marker.is_empty() {
            bail!("relay.marker must not be empty");
        }
        Ok(())
    }

    /// Absolute path of the frame database.
    pub fn database_path(&self) -> Result<PathBuf> {
        let path = PathBuf::from(&self.database.path);
        if path.is_absolute() {
            return Ok(path);
        }
        Ok(std::env::current_dir()?.join(path))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node: NodeConfig {
                callsign: "N0CALL-1".to_string(),
            },
            serial: SerialConfig::default(),
            database: DatabaseConfig::default(),
            relay: RelayConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("meshcom-gateway.log".to_string()),
            },
            stats: StatsConfig::default(),
        }
    }
}
