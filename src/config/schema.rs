//! Configuration schema for fnplane
//!
//! Configuration is stored at `~/.config/fnplane/config.toml`

use crate::cache::CacheOptions;
use crate::error::{FnplaneError, FnplaneResult};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Builder server settings
    pub builder: BuilderConfig,

    /// Issued artifact name registry settings
    pub cache: CacheConfig,
}

impl Config {
    /// Reject values that parse but cannot be used
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            return Err(format!(
                "general.log_format must be \"text\" or \"json\", got {:?}",
                self.general.log_format
            ));
        }
        if self.builder.bind.parse::<IpAddr>().is_err() {
            return Err(format!(
                "builder.bind is not an IP address: {:?}",
                self.builder.bind
            ));
        }
        if self.cache.channel_capacity == 0 {
            return Err("cache.channel_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Builder server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Address to listen on
    pub bind: String,

    /// Port to listen on
    pub port: u16,

    /// Command run when a request does not name one
    pub default_command: String,
}

impl BuilderConfig {
    pub fn socket_addr(&self) -> FnplaneResult<SocketAddr> {
        let ip: IpAddr = self.bind.parse().map_err(|_| {
            FnplaneError::invalid(format!("invalid bind address: {}", self.bind))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
            default_command: crate::builder::DEFAULT_BUILD_COMMAND.to_string(),
        }
    }
}

/// Configuration of the builder's issued artifact name registry
///
/// Names are remembered so a random suffix is never handed out twice while
/// they are held. Forgotten names are still checked against the shared volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Evict entries unread for this many seconds (0 = disabled)
    pub idle_ttl_secs: u64,

    /// Evict entries older than this many seconds (0 = disabled)
    pub max_age_secs: u64,

    /// Eviction sweep period in seconds
    pub sweep_interval_secs: u64,

    /// Request channel bound
    pub channel_capacity: usize,
}

impl CacheConfig {
    pub fn options(&self) -> CacheOptions {
        CacheOptions {
            idle_ttl: secs(self.idle_ttl_secs),
            max_age: secs(self.max_age_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            channel_capacity: self.channel_capacity,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 0,
            max_age_secs: crate::builder::ISSUED_NAME_MAX_AGE.as_secs(),
            sweep_interval_secs: 60,
            channel_capacity: crate::cache::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

fn secs(n: u64) -> Option<Duration> {
    (n > 0).then(|| Duration::from_secs(n))
}

/// TOML type of a settable key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Integer,
}

/// Every key `config set` accepts
pub const KEYS: &[(&str, ValueKind)] = &[
    ("general.log_format", ValueKind::String),
    ("builder.bind", ValueKind::String),
    ("builder.port", ValueKind::Integer),
    ("builder.default_command", ValueKind::String),
    ("cache.idle_ttl_secs", ValueKind::Integer),
    ("cache.max_age_secs", ValueKind::Integer),
    ("cache.sweep_interval_secs", ValueKind::Integer),
    ("cache.channel_capacity", ValueKind::Integer),
];

/// Look up the type of a dotted key
pub fn key_kind(key: &str) -> Option<ValueKind> {
    KEYS.iter().find(|(k, _)| *k == key).map(|(_, kind)| *kind)
}
