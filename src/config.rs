// ABOUTME: TOML configuration for the server and CLI
// ABOUTME: Every section has defaults, so an empty or missing file is a valid config

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::SyncConfig;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR: &str = "database-syncer";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub sync: SyncSection,
    pub token: TokenConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// Base URL used in links sent to admins.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            public_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: app_dir().join("syncer.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub batch_size: usize,
    pub connect_retries: u32,
}

impl Default for SyncSection {
    fn default() -> Self {
        let defaults = SyncConfig::default();
        Self {
            batch_size: defaults.batch_size,
            connect_retries: defaults.connect_retries,
        }
    }
}

impl From<&SyncSection> for SyncConfig {
    fn from(section: &SyncSection) -> Self {
        SyncConfig {
            batch_size: section.batch_size,
            connect_retries: section.connect_retries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Signing key for view links. Empty means a random key per process.
    pub secret: String,
    pub ttl_hours: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Email relay endpoint. Without one, notices only go to the log.
    pub webhook_url: Option<String>,
    pub from: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            from: "database-syncer@localhost".to_string(),
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn default_config_path() -> PathBuf {
    app_dir().join(CONFIG_FILE_NAME)
}

impl Config {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config = Self::parse(&raw)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 {
            bail!("sync.batch_size must be at least 1");
        }
        if self.token.ttl_hours <= 0 {
            bail!("token.ttl_hours must be positive");
        }
        if let Some(url) = &self.notify.webhook_url {
            url::Url::parse(url)
                .with_context(|| format!("notify.webhook_url '{}' is not a valid URL", url))?;
        }
        url::Url::parse(&self.server.public_url).with_context(|| {
            format!("server.public_url '{}' is not a valid URL", self.server.public_url)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.token.ttl_hours, 24);
        assert!(config.notify.webhook_url.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [server]
            listen = "0.0.0.0:9000"

            [sync]
            batch_size = 500

            [notify]
            webhook_url = "https://relay.example.com/send"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.server.public_url, "http://localhost:8080");
        assert_eq!(config.sync.batch_size, 500);
        assert_eq!(config.sync.connect_retries, 0);
        assert_eq!(
            config.notify.webhook_url.as_deref(),
            Some("https://relay.example.com/send")
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::parse("[sync]\nbatch_size = 0").is_err());
        assert!(Config::parse("[token]\nttl_hours = 0").is_err());
        assert!(Config::parse("[notify]\nwebhook_url = \"not a url\"").is_err());
        assert!(Config::parse("[server]\nlisten = 5").is_err());
    }

    #[test]
    fn test_load_missing_file_and_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        fs::write(&path, "[store]\npath = \"/tmp/meta.db\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/meta.db"));
    }
}
