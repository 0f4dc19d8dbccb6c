//! Skyroster configuration system.
//!
//! Loaded from `~/.skyroster/config.toml`; every field has a serde default so
//! a missing or partial file still yields a runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SkyError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkyrosterConfig {
    /// Path to the alert engine's own database (queue + send log).
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Path to the roster database (read-only: pilots, checks, users).
    #[serde(default = "default_roster_db_path")]
    pub roster_db_path: String,
    /// Days-remaining values at which an expiry alert fires.
    #[serde(default = "default_thresholds")]
    pub alert_thresholds: Vec<u32>,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

fn default_db_path() -> String {
    SkyrosterConfig::home_dir()
        .join("alerts.db")
        .to_string_lossy()
        .into_owned()
}
fn default_roster_db_path() -> String {
    SkyrosterConfig::home_dir()
        .join("roster.db")
        .to_string_lossy()
        .into_owned()
}
fn default_thresholds() -> Vec<u32> {
    vec![30, 14, 7, 3, 1]
}

impl Default for SkyrosterConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            roster_db_path: default_roster_db_path(),
            alert_thresholds: default_thresholds(),
            queue: QueueConfig::default(),
            cache: CacheConfig::default(),
            cleanup: CleanupConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

/// Notification queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Delivery attempts before a task goes terminal Failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Max tasks dequeued per drain.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Concurrent delivery workers per drain.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Hard timeout per delivery-channel call.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_batch_size() -> usize {
    50
}
fn default_workers() -> usize {
    4
}
fn default_send_timeout() -> u64 {
    30
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            batch_size: default_batch_size(),
            workers: default_workers(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

/// Ephemeral cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    /// Max entries before oldest-first eviction kicks in.
    #[serde(default = "default_cache_max")]
    pub max_entries: usize,
}

fn default_cache_ttl() -> u64 {
    300
}
fn default_cache_max() -> usize {
    256
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_max(),
        }
    }
}

/// Cleanup sweep tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Send-log rows and terminal tasks older than this are purged.
    #[serde(default = "default_retention")]
    pub retention_days: u32,
}

fn default_retention() -> u32 {
    30
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention(),
        }
    }
}

/// SMTP delivery channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_from_address() -> String {
    "alerts@skyroster.local".into()
}
fn default_from_name() -> String {
    "Skyroster Alerts".into()
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_address: default_from_address(),
            from_name: default_from_name(),
        }
    }
}

impl SkyrosterConfig {
    /// Load config from the default path (~/.skyroster/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SkyError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SkyError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SkyError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Skyroster home directory (~/.skyroster).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".skyroster")
    }
}
