//! Operator configuration.
//!
//! Layering: built-in defaults, then `<root>/config.json` if it parses, then
//! environment overrides. A missing or broken config file never stops startup.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::StorageConfig;

pub const SECRET_ENV: &str = "DATA_SECRET_KEY";
pub const API_BASE_ENV: &str = "HIVEMIND_API_BASE_URL";
/// Name the web build used; still honoured so one `.env` serves both.
pub const LEGACY_API_BASE_ENV: &str = "VITE_API_BASE_URL";
pub const GITHUB_API_BASE_ENV: &str = "HIVEMIND_GITHUB_API_BASE_URL";
pub const STORE_NAME_ENV: &str = "HIVEMIND_STORE_NAME";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub store_name: String,
    pub api_base_url: String,
    pub github_api_base_url: String,
    pub oauth_install_url: String,
    pub url_scheme: String,
    pub display_poll_interval_ms: u64,
    pub http_timeout_secs: u64,
    pub http_max_retries: u32,
    pub http_retry_delay_ms: u64,
    pub quit_on_last_window_closed: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_name: "Desktop".to_string(),
            api_base_url: "http://localhost:8000".to_string(),
            github_api_base_url: "https://api.github.com".to_string(),
            oauth_install_url: "https://github.com/apps/hackuri-hivemind/installations/new"
                .to_string(),
            url_scheme: "hivemind".to_string(),
            display_poll_interval_ms: 500,
            http_timeout_secs: 15,
            http_max_retries: 0,
            http_retry_delay_ms: 250,
            quit_on_last_window_closed: true,
        }
    }
}

impl AppConfig {
    /// Loads config for the given storage root with process env overrides applied.
    pub fn load(storage: &StorageConfig) -> Self {
        let mut config = Self::from_file(&storage.config_file());
        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    /// Reads a config file, returning defaults if it is missing or malformed.
    pub fn from_file(path: &Path) -> Self {
        let content = match fs_err::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read config file; using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %path.display(),
                    "Config file malformed; using defaults"
                );
                Self::default()
            }
        }
    }

    /// Applies overrides from a key lookup (the process env in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(base) = non_empty(API_BASE_ENV).or_else(|| non_empty(LEGACY_API_BASE_ENV)) {
            self.api_base_url = base;
        }
        if let Some(base) = non_empty(GITHUB_API_BASE_ENV) {
            self.github_api_base_url = base;
        }
        if let Some(name) = non_empty(STORE_NAME_ENV) {
            self.store_name = name;
        }
    }

    pub fn display_poll_interval(&self) -> Duration {
        Duration::from_millis(self.display_poll_interval_ms.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}

/// The vault secret. Empty when unset, which still encrypts but offers no
/// protection beyond obscurity.
pub fn data_secret() -> String {
    let secret = env::var(SECRET_ENV).unwrap_or_default();
    if secret.is_empty() {
        tracing::warn!(env = SECRET_ENV, "Vault secret is empty; stored tokens are weakly protected");
    }
    secret
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = AppConfig::from_file(&temp.path().join("config.json"));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.display_poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(AppConfig::from_file(&path), AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"apiBaseUrl":"https://api.example.com","httpMaxRetries":2}"#)
            .unwrap();
        let config = AppConfig::from_file(&path);
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.http_max_retries, 2);
        assert_eq!(config.store_name, "Desktop");
    }

    #[test]
    fn env_overrides_win_and_legacy_name_is_accepted() {
        let vars: HashMap<&str, &str> = [(LEGACY_API_BASE_ENV, "http://legacy:9000")].into();
        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "http://legacy:9000");

        let vars: HashMap<&str, &str> = [
            (API_BASE_ENV, "http://primary:1"),
            (LEGACY_API_BASE_ENV, "http://legacy:9000"),
            (STORE_NAME_ENV, "Test"),
        ]
        .into();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "http://primary:1");
        assert_eq!(config.store_name, "Test");
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(|_| Some("   ".to_string()));
        assert_eq!(config, AppConfig::default());
    }
}
