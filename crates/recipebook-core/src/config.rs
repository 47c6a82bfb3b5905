//! Application configuration management.
//!
//! Holds the identity-provider API key and endpoints, the recipe database
//! URL and the last email used to sign in.
//!
//! Configuration is stored at `~/.config/recipebook/config.json`. The
//! `RECIPEBOOK_API_KEY`, `RECIPEBOOK_IDENTITY_URL` and
//! `RECIPEBOOK_DATABASE_URL` environment variables take precedence over the
//! file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_IDENTITY_BASE_URL;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "recipebook";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_API_KEY: &str = "RECIPEBOOK_API_KEY";
const ENV_IDENTITY_URL: &str = "RECIPEBOOK_IDENTITY_URL";
const ENV_DATABASE_URL: &str = "RECIPEBOOK_DATABASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_key: Option<String>,
    pub identity_base_url: Option<String>,
    pub database_url: Option<String>,
    pub last_email: Option<String>,
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(url) = get(ENV_IDENTITY_URL) {
            self.identity_base_url = Some(url);
        }
        if let Some(url) = get(ENV_DATABASE_URL) {
            self.database_url = Some(url);
        }
    }

    pub fn identity_base_url(&self) -> &str {
        self.identity_base_url
            .as_deref()
            .unwrap_or(DEFAULT_IDENTITY_BASE_URL)
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No identity API key configured. Set {} or add api_key to {}", ENV_API_KEY, CONFIG_FILE)
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No recipe database configured. Set {} or add database_url to {}", ENV_DATABASE_URL, CONFIG_FILE)
        })
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.identity_base_url(), DEFAULT_IDENTITY_BASE_URL);
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            api_key: Some("key".to_string()),
            database_url: Some("https://db.example".to_string()),
            last_email: Some("a@x.com".to_string()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.require_api_key().unwrap(), "key");
        assert_eq!(loaded.require_database_url().unwrap(), "https://db.example");
        assert_eq!(loaded.last_email.as_deref(), Some("a@x.com"));
    }

    #[test]
    fn test_overrides_win_over_file_values() {
        let mut config = Config {
            api_key: Some("from-file".to_string()),
            database_url: Some("https://file.example".to_string()),
            ..Default::default()
        };
        config.apply_overrides(|name| match name {
            ENV_API_KEY => Some("from-env".to_string()),
            ENV_DATABASE_URL => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
        // Blank values are ignored
        assert_eq!(config.database_url.as_deref(), Some("https://file.example"));
    }
}
