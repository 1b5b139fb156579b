//! House configuration
//!
//! Loaded from an optional JSON file, then overridden by `ROLLET_*`
//! environment variables.

use crate::error::HouseError;
use rollet_certs::{bet::BET_CERT_TTL_MS, join::CHALLENGE_TTL_MS, totp};
use rollet_sync::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// House signing key seed (hex)
pub const ENV_HOUSE_KEY: &str = "ROLLET_HOUSE_KEY";
/// Authority base URL; unset means offline sync
pub const ENV_AUTH_URL: &str = "ROLLET_AUTH_URL";
pub const ENV_DATA_DIR: &str = "ROLLET_DATA_DIR";
/// Root public key (hex)
pub const ENV_ROOT_PUBLIC_KEY: &str = "ROLLET_ROOT_PUBLIC_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseConfig {
    // === Storage ===
    /// Ledger and watermark directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    // === Identity ===
    /// House key seed (hex); takes precedence over `house_key_path`
    #[serde(default)]
    pub house_key: Option<String>,

    #[serde(default = "default_house_key_path")]
    pub house_key_path: PathBuf,

    /// House certificate, JSON or PEM
    #[serde(default = "default_house_cert_path")]
    pub house_cert_path: PathBuf,

    #[serde(default)]
    pub root_public_key: Option<String>,

    /// Allow-list JSON; when unset the authorization gate is skipped
    #[serde(default)]
    pub allow_list_path: Option<PathBuf>,

    // === Lifetimes ===
    #[serde(default = "default_challenge_ttl_ms")]
    pub challenge_ttl_ms: i64,

    #[serde(default = "default_bet_cert_ttl_ms")]
    pub bet_cert_ttl_ms: i64,

    /// Receipt lifetime; unset receipts never expire
    #[serde(default)]
    pub receipt_ttl_ms: Option<i64>,

    // === Codes ===
    #[serde(default = "default_totp_step_ms")]
    pub totp_step_ms: i64,

    #[serde(default = "default_totp_window")]
    pub totp_window: u32,

    // === Authority ===
    #[serde(default)]
    pub auth_url: Option<String>,

    #[serde(default = "default_sync_max_attempts")]
    pub sync_max_attempts: usize,

    #[serde(default = "default_sync_initial_backoff_ms")]
    pub sync_initial_backoff_ms: u64,

    #[serde(default = "default_sync_max_backoff_ms")]
    pub sync_max_backoff_ms: u64,

    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
}

// Default value functions for serde
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_house_key_path() -> PathBuf {
    PathBuf::from("house.key")
}

fn default_house_cert_path() -> PathBuf {
    PathBuf::from("house-cert.pem")
}

fn default_challenge_ttl_ms() -> i64 {
    CHALLENGE_TTL_MS
}

fn default_bet_cert_ttl_ms() -> i64 {
    BET_CERT_TTL_MS
}

fn default_totp_step_ms() -> i64 {
    totp::DEFAULT_STEP_MS
}

fn default_totp_window() -> u32 {
    totp::DEFAULT_WINDOW
}

fn default_sync_max_attempts() -> usize {
    3
}

fn default_sync_initial_backoff_ms() -> u64 {
    200
}

fn default_sync_max_backoff_ms() -> u64 {
    2_000
}

fn default_sync_timeout_ms() -> u64 {
    10_000
}

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            house_key: None,
            house_key_path: default_house_key_path(),
            house_cert_path: default_house_cert_path(),
            root_public_key: None,
            allow_list_path: None,
            challenge_ttl_ms: default_challenge_ttl_ms(),
            bet_cert_ttl_ms: default_bet_cert_ttl_ms(),
            receipt_ttl_ms: None,
            totp_step_ms: default_totp_step_ms(),
            totp_window: default_totp_window(),
            auth_url: None,
            sync_max_attempts: default_sync_max_attempts(),
            sync_initial_backoff_ms: default_sync_initial_backoff_ms(),
            sync_max_backoff_ms: default_sync_max_backoff_ms(),
            sync_timeout_ms: default_sync_timeout_ms(),
        }
    }
}

impl HouseConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &Path) -> Result<Self, HouseError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| HouseError::Config(format!("{}: {}", path.display(), e)))
    }

    /// File (if any), then process environment
    pub fn load(path: Option<&Path>) -> Result<Self, HouseError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_overrides(|name| std::env::var(name).ok()))
    }

    /// Apply `ROLLET_*` overrides from `lookup`; empty values are ignored
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_HOUSE_KEY) {
            self.house_key = Some(key);
        }
        if let Some(url) = get(ENV_AUTH_URL) {
            self.auth_url = Some(url);
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(pk) = get(ENV_ROOT_PUBLIC_KEY) {
            self.root_public_key = Some(pk);
        }
        self
    }

    pub fn challenge_ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.challenge_ttl_ms)
    }

    pub fn bet_cert_ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.bet_cert_ttl_ms)
    }

    pub fn receipt_ttl(&self) -> Option<chrono::Duration> {
        self.receipt_ttl_ms.map(chrono::Duration::milliseconds)
    }

    pub fn totp_step(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.totp_step_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sync_max_attempts,
            initial_backoff: Duration::from_millis(self.sync_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.sync_max_backoff_ms),
            request_timeout: Duration::from_millis(self.sync_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = HouseConfig::default();

        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.challenge_ttl_ms, 15_000);
        assert_eq!(config.bet_cert_ttl_ms, 300_000);
        assert_eq!(config.receipt_ttl_ms, None);
        assert_eq!(config.totp_step_ms, 60_000);
        assert_eq!(config.totp_window, 1);
        assert!(config.auth_url.is_none());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HouseConfig =
            serde_json::from_str(r#"{"data_dir": "/var/rollet", "totp_window": 2}"#).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/rollet"));
        assert_eq!(config.totp_window, 2);
        assert_eq!(config.challenge_ttl_ms, 15_000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_AUTH_URL, "https://authority.example"),
            (ENV_DATA_DIR, "/tmp/rollet"),
            (ENV_HOUSE_KEY, ""),
        ]
        .into_iter()
        .collect();

        let config = HouseConfig::default()
            .with_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.auth_url.as_deref(), Some("https://authority.example"));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/rollet"));
        assert!(config.house_key.is_none());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("house.json");
        std::fs::write(&path, r#"{"receipt_ttl_ms": 3600000}"#).unwrap();
        let config = HouseConfig::from_file(&path).unwrap();
        assert_eq!(config.receipt_ttl(), Some(chrono::Duration::hours(1)));

        std::fs::write(&path, "{bad").unwrap();
        assert!(matches!(
            HouseConfig::from_file(&path),
            Err(HouseError::Config(_))
        ));
    }
}
