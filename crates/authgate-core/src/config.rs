//! Gateway configuration.
//!
//! Holds the API location, the refresh endpoint, the public-route list and
//! request timeouts. Configuration is stored at
//! `~/.config/authgate/config.json`; a missing file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::credentials::DEFAULT_TOKEN_KEY;

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "authgate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `base_url`
pub const API_URL_ENV: &str = "AUTHGATE_API_URL";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server origin, e.g. `https://api.example.com`
    pub base_url: String,
    /// Prefix joined onto `base_url` for every request path
    pub api_prefix: String,
    /// Path of the endpoint exchanging the refresh cookie for a new token
    pub refresh_path: String,
    /// Path fragments of routes that never need credentials
    pub public_routes: Vec<String>,
    pub timeout_secs: u64,
    /// Upper bound on one refresh; waiters see a failure when it elapses.
    /// Defaults to `timeout_secs` when unset.
    pub refresh_timeout_secs: Option<u64>,
    /// Storage key holding the access token
    pub token_key: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_prefix: "/api".to_string(),
            refresh_path: "/auth/refresh-token".to_string(),
            public_routes: vec!["/auth/login".to_string(), "/auth/register".to_string()],
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            refresh_timeout_secs: None,
            token_key: DEFAULT_TOKEN_KEY.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Defaults pointed at `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load from the config file (or defaults), then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    /// Read `path`; a missing file means defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Write to the config file and return where it went
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to encode config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
    }

    /// Base URL every request path is joined onto
    pub fn api_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_matches('/')
        )
        .trim_end_matches('/')
        .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs.unwrap_or(self.timeout_secs))
    }
}
