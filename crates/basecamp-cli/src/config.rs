//! Application configuration management.
//!
//! Configuration is stored at `<config_dir>/basecamp/config.json`; the
//! cache and mutation queue live under `<cache_dir>/basecamp/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use basecamp_core::config::EngineConfig;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "basecamp";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides `base_url` when set
pub const BASE_URL_ENV: &str = "BASECAMP_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub base_url: Option<String>,
    #[serde(flatten)]
    pub engine: EngineConfig,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where the cache entries and the mutation queue are persisted.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base URL from the environment, then the config file.
    pub fn resolve_base_url(&self, from_env: Option<String>) -> Result<String> {
        from_env
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.base_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No base URL configured. Set {} or add \"base_url\" to {}",
                    BASE_URL_ENV,
                    CONFIG_FILE
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.engine.default_ttl_secs, 300);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            base_url: Some("https://api.example.org".to_string()),
            engine: EngineConfig {
                default_ttl_secs: 60,
                request_timeout_secs: 10,
            },
            last_username: Some("leader".to_string()),
        };

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded, config);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"default_ttl_secs\": 60"));
    }

    #[test]
    fn test_env_base_url_wins() {
        let config = Config {
            base_url: Some("https://from-file".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_base_url(Some("https://from-env".to_string())).unwrap(),
            "https://from-env"
        );
        assert_eq!(config.resolve_base_url(Some("  ".to_string())).unwrap(), "https://from-file");
        assert!(Config::default().resolve_base_url(None).is_err());
    }
}
