//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the API base URL, refresh and timeout tuning, the credential
//! storage backend and the last used email.
//!
//! Configuration is stored at `~/.config/recipehub/config.json`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::transport::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::api::{ApiClient, ReqwestTransport};
use crate::auth::{CredentialStore, SessionManager, DEFAULT_REFRESH_INTERVAL_SECS};
use crate::storage::{FileStore, KeyValueStore, KeyringStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "recipehub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "RECIPEHUB_API_URL";

/// Port the RecipeHub API listens on
const API_PORT: u16 = 8000;

/// Used when neither the environment nor the config names a server
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file in the data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub refresh_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub storage: StorageBackend,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
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

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the file credential store
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Base URL, from the environment, then this config, then the default
    pub fn api_base_url(&self) -> String {
        resolve_api_base_url(std::env::var(API_URL_ENV).ok(), self.api_base_url.as_deref())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(
            self.refresh_interval_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn credential_backend(&self) -> Result<Arc<dyn KeyValueStore>> {
        Ok(match self.storage {
            StorageBackend::File => Arc::new(FileStore::new(self.data_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStore::default()),
        })
    }

    /// Wire up a session manager over the real HTTP transport
    pub fn build_session(&self) -> Result<SessionManager> {
        let transport = ReqwestTransport::with_timeout(self.request_timeout())
            .context("Failed to build HTTP client")?;
        let api = ApiClient::new(Arc::new(transport), self.api_base_url());
        let credentials = CredentialStore::new(self.credential_backend()?);
        Ok(SessionManager::new(api, credentials, self.refresh_interval()))
    }
}

fn resolve_api_base_url(env: Option<String>, configured: Option<&str>) -> String {
    env.filter(|url| !url.trim().is_empty())
        .or_else(|| {
            configured
                .filter(|url| !url.trim().is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
}

/// API base for a front end served from `host`: the API runs on port 8000
/// of the same machine, addressed as `localhost` when the host is loopback.
pub fn api_base_for_host(scheme: &str, host: &str) -> String {
    let scheme = scheme.trim_end_matches(':');
    match host {
        "localhost" | "127.0.0.1" | "::1" | "[::1]" => {
            format!("{}://localhost:{}", scheme, API_PORT)
        }
        _ => format!("{}://{}:{}", scheme, host, API_PORT),
    }
}
