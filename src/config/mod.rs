//! Configuration management for fnplane

pub mod schema;

pub use schema::Config;

use crate::error::{FnplaneError, FnplaneResult};
use schema::ValueKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use toml_edit::DocumentMut;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fnplane")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> FnplaneResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> FnplaneResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| FnplaneError::io(format!("reading config from {}", path.display()), e))?;

        let config: Config = toml::from_str(&content).map_err(|e| FnplaneError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config
            .validate()
            .map_err(|reason| FnplaneError::ConfigInvalid {
                path: path.to_path_buf(),
                reason,
            })?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> FnplaneResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        self.write(&content).await?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Set one dotted key in the file, keeping its comments and layout.
    ///
    /// Returns the configuration as it reads after the edit.
    pub async fn set_value(&self, key: &str, value: &str) -> FnplaneResult<Config> {
        let kind = schema::key_kind(key)
            .ok_or_else(|| FnplaneError::User(format!("Unknown config key: {}", key)))?;
        let (section, field) = key
            .split_once('.')
            .ok_or_else(|| FnplaneError::User(format!("Unknown config key: {}", key)))?;

        let content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path).await.map_err(|e| {
                FnplaneError::io(format!("reading {}", self.config_path.display()), e)
            })?
        } else {
            String::new()
        };
        let mut doc: DocumentMut = content.parse().map_err(|e: toml_edit::TomlError| {
            FnplaneError::ConfigInvalid {
                path: self.config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let item = match kind {
            ValueKind::String => toml_edit::value(value),
            ValueKind::Integer => {
                let n: i64 = value
                    .parse()
                    .map_err(|_| FnplaneError::User(format!("Invalid number: {}", value)))?;
                toml_edit::value(n)
            }
        };

        doc.entry(section)
            .or_insert(toml_edit::table())
            .as_table_mut()
            .ok_or_else(|| FnplaneError::User(format!("Expected table at key: {}", section)))?
            .insert(field, item);

        let rendered = doc.to_string();
        let config: Config = toml::from_str(&rendered)
            .map_err(|e| FnplaneError::User(format!("Invalid value for {}: {}", key, e)))?;
        config.validate().map_err(FnplaneError::User)?;

        self.ensure_config_dir().await?;
        self.write(&rendered).await?;
        debug!(key, value, "config value set");
        Ok(config)
    }

    async fn write(&self, content: &str) -> FnplaneResult<()> {
        fs::write(&self.config_path, content).await.map_err(|e| {
            FnplaneError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> FnplaneResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FnplaneError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.builder.port, 8000);
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.builder.default_command = "/usr/local/bin/build".to_string();

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.builder.default_command, "/usr/local/bin/build");
    }

    #[tokio::test]
    async fn invalid_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[general]\nlog_format = \"yaml\"\n").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, FnplaneError::ConfigInvalid { .. }));
    }

    #[tokio::test]
    async fn set_value_keeps_comments() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "# tuned for staging\n[builder]\nport = 8000\n").unwrap();
        let manager = ConfigManager::with_path(path.clone());

        let config = manager.set_value("builder.port", "9100").await.unwrap();

        assert_eq!(config.builder.port, 9100);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# tuned for staging"));
        assert!(content.contains("port = 9100"));
    }

    #[tokio::test]
    async fn set_value_creates_file_and_section() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        manager.set_value("cache.idle_ttl_secs", "300").await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.cache.idle_ttl_secs, 300);
    }

    #[tokio::test]
    async fn set_value_rejects_bad_input() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path.clone());

        assert!(manager.set_value("vm.name", "x").await.is_err());
        assert!(manager.set_value("builder.port", "eighty").await.is_err());
        assert!(manager.set_value("builder.port", "70000").await.is_err());
        assert!(manager.set_value("general.log_format", "xml").await.is_err());
        assert!(!path.exists());
    }
}
