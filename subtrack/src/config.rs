//! Application configuration
//!
//! Central location for configuration constants plus the `AppConfig` file
//! that lives in the data directory. A missing file yields defaults.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

// ===== Remote Store =====

/// Remote collection holding one document per subscription
pub const SUBSCRIPTIONS_COLLECTION: &str = "subscriptions";

/// Default Firestore REST endpoint
pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";

// ===== Local Mirror Keys =====

/// Primary mirror of the subscription list
pub const MIRROR_KEY: &str = "subscriptions";

/// Secondary copy written on every successful remote read or snapshot
pub const MIRROR_BACKUP_KEY: &str = "subscriptions_backup";

/// Key used by older releases; only consulted when migrating
pub const LEGACY_MIRROR_KEY: &str = "subscription-manager-data";

// ===== Status Thresholds =====

/// Days ahead of expiry at which a subscription counts as expiring soon
pub const DEFAULT_EXPIRING_THRESHOLD_DAYS: i64 = 7;

/// Default width of the renewals range view, in days from today
pub const DEFAULT_RENEWAL_RANGE_DAYS: i64 = 7;

// ===== Intervals =====

/// Mirror polling interval used when the remote store is not configured
pub const DEFAULT_LOCAL_POLL_INTERVAL_MS: u64 = 1_000;

/// Remote polling interval backing the REST change feed
pub const DEFAULT_REMOTE_POLL_INTERVAL_MS: u64 = 5_000;

/// Renewal notice check interval (1 minute)
pub const DEFAULT_NOTICE_INTERVAL_SECS: u64 = 60;

/// Lower bound for any poll interval
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Name of the configuration file inside the data directory
pub const CONFIG_FILE_NAME: &str = "subtrack.json";

/// Name of the SQLite database holding the local mirror
pub const MIRROR_DB_FILE_NAME: &str = "mirror.db";

/// Connection details for the remote document store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    pub project_id: String,
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_base_url() -> String {
    DEFAULT_FIRESTORE_BASE_URL.to_string()
}

fn default_database() -> String {
    "(default)".to_string()
}

impl RemoteConfig {
    /// A config with placeholder values counts as not configured
    pub fn is_usable(&self) -> bool {
        !self.project_id.trim().is_empty()
            && !self.api_key.trim().is_empty()
            && self.api_key != "YOUR_API_KEY"
    }
}

/// Persisted application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
    #[serde(default = "default_expiring_threshold")]
    pub expiring_threshold_days: i64,
    #[serde(default = "default_local_poll")]
    pub local_poll_interval_ms: u64,
    #[serde(default = "default_remote_poll")]
    pub remote_poll_interval_ms: u64,
    #[serde(default = "default_notice_interval")]
    pub notice_interval_secs: u64,
}

fn default_expiring_threshold() -> i64 {
    DEFAULT_EXPIRING_THRESHOLD_DAYS
}

fn default_local_poll() -> u64 {
    DEFAULT_LOCAL_POLL_INTERVAL_MS
}

fn default_remote_poll() -> u64 {
    DEFAULT_REMOTE_POLL_INTERVAL_MS
}

fn default_notice_interval() -> u64 {
    DEFAULT_NOTICE_INTERVAL_SECS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote: None,
            expiring_threshold_days: default_expiring_threshold(),
            local_poll_interval_ms: default_local_poll(),
            remote_poll_interval_ms: default_remote_poll(),
            notice_interval_secs: default_notice_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file, falling back to defaults when absent
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).await?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;

        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Write configuration as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;

        tracing::debug!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.expiring_threshold_days < 0 {
            return Err(AppError::Config(format!(
                "expiring_threshold_days must not be negative (got {})",
                self.expiring_threshold_days
            )));
        }

        if self.local_poll_interval_ms < MIN_POLL_INTERVAL_MS
            || self.remote_poll_interval_ms < MIN_POLL_INTERVAL_MS
        {
            return Err(AppError::Config(format!(
                "poll intervals must be at least {}ms",
                MIN_POLL_INTERVAL_MS
            )));
        }

        if self.notice_interval_secs == 0 {
            return Err(AppError::Config(
                "notice_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Remote settings, if present and not placeholders
    pub fn usable_remote(&self) -> Option<&RemoteConfig> {
        self.remote.as_ref().filter(|r| r.is_usable())
    }

    pub fn local_poll_interval(&self) -> Duration {
        Duration::from_millis(self.local_poll_interval_ms)
    }

    pub fn remote_poll_interval(&self) -> Duration {
        Duration::from_millis(self.remote_poll_interval_ms)
    }

    pub fn notice_interval(&self) -> Duration {
        Duration::from_secs(self.notice_interval_secs)
    }
}
