//! Client configuration management.
//!
//! This module handles loading and saving the client configuration,
//! which includes the API base URL, network timeouts, the credential
//! store backend and the last used username.
//!
//! Configuration is stored at `~/.config/unigate/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{CredentialStore, FileStore, KeyringStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "unigate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the configured base URL
pub const API_URL_ENV: &str = "UNIGATE_API_URL";

/// Base URL used when nothing is configured
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Connectivity probe timeout in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 15;

/// Where session credentials are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub store: StoreBackend,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            store: StoreBackend::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the session file
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// A zero timeout would fail every call; it reads as the default
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(non_zero_or(self.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(non_zero_or(self.probe_timeout_secs, DEFAULT_PROBE_TIMEOUT_SECS))
    }

    /// Open the configured credential store
    pub fn open_store(&self) -> Result<Box<dyn CredentialStore>> {
        let store: Box<dyn CredentialStore> = match self.store {
            StoreBackend::File => Box::new(FileStore::in_dir(self.data_dir()?)),
            StoreBackend::Keyring => Box::new(KeyringStore::new()),
        };
        Ok(store)
    }
}

fn non_zero_or(secs: u64, default: u64) -> u64 {
    if secs == 0 {
        warn!(default, "Timeout of 0 seconds configured, using default");
        default
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"base_url":"https://portal.example.edu/api","store":"keyring"}"#)
                .unwrap();
        assert_eq!(config.base_url, "https://portal.example.edu/api");
        assert_eq!(config.store, StoreBackend::Keyring);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.probe_timeout(), Duration::from_secs(15));
        assert_eq!(config.last_username, None);
    }

    #[test]
    fn test_zero_timeouts_fall_back_to_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"request_timeout_secs":0,"probe_timeout_secs":0}"#).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
        assert_eq!(config.probe_timeout(), Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS));

        let config: Config = serde_json::from_str(r#"{"request_timeout_secs":3}"#).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
    }
}
