//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API endpoint, the default landing view, the last used
//! email, and whether the session file is sealed.
//!
//! Configuration is stored at `~/.config/expensa/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{CredentialStore, FileStore, DEFAULT_DESTINATION};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "expensa";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Endpoint of a locally running expense server
pub const DEFAULT_API_URL: &str = "http://localhost:3010/graphql";

/// Environment variable that overrides the configured endpoint
pub const API_URL_ENV: &str = "EXPENSA_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub default_destination: Option<String>,
    pub last_email: Option<String>,
    pub encrypt_session: Option<bool>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read config file")?;
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

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Endpoint to talk to: environment override, then config, then the local default
    pub fn api_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn default_destination(&self) -> &str {
        self.default_destination
            .as_deref()
            .unwrap_or(DEFAULT_DESTINATION)
    }

    /// Sealing is on unless explicitly disabled
    pub fn encrypt_session(&self) -> bool {
        self.encrypt_session.unwrap_or(true)
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn session_path(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join(SESSION_FILE))
    }

    /// Open the on-disk session store, sealed with the keychain secret when
    /// sealing is enabled. Falls back to a plain file if the keychain is unavailable.
    pub fn open_session_store(&self) -> Result<FileStore> {
        let path = self.session_path()?;
        if !self.encrypt_session() {
            return FileStore::open(path);
        }

        match CredentialStore::store_secret() {
            Ok(secret) => FileStore::open_sealed(path, secret),
            Err(e) => {
                warn!(error = %e, "Keychain unavailable, storing session unsealed");
                FileStore::open(path)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.default_destination(), "expense");
        assert!(config.encrypt_session());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = Config {
            api_url: Some("https://expenses.example.com/graphql".to_string()),
            default_destination: Some("report".to_string()),
            last_email: Some("sam@example.com".to_string()),
            encrypt_session: Some(false),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.default_destination(), "report");
        assert_eq!(loaded.last_email.as_deref(), Some("sam@example.com"));
        assert!(!loaded.encrypt_session());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert!(loaded.api_url.is_none());
    }
}
