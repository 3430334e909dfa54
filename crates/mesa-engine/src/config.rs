//! # Engine Configuration
//!
//! Configuration for the settlement engine and its background work.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MESA_DB_PATH=/var/lib/mesa/pos.db                                  │
//! │     MESA_MAX_SIDE_EFFECTS=16                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/mesa-pos/engine.toml (Linux)                             │
//! │     ~/Library/Application Support/com.mesa.pos/engine.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! [database]
//! path = "mesa.db"
//! max_connections = 5
//! busy_timeout_secs = 5
//!
//! [side_effects]
//! max_concurrent = 8
//!
//! [invoice_retry]
//! poll_interval_secs = 30
//! batch_size = 20
//! max_attempts = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use mesa_db::DbConfig;

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid engine configuration: {0}")]
    Invalid(String),

    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Failed to save config: {0}")]
    SaveFailed(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the write lock held by another
    /// settlement before giving up.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("mesa.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

/// Bounds the post-commit background work (printing, invoicing, export).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideEffectSettings {
    /// Maximum side-effect tasks talking to collaborators at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    8
}

impl Default for SideEffectSettings {
    fn default() -> Self {
        SideEffectSettings {
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRetrySettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Queue entries resubmitted per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Entries with this many failed attempts are left for manual review.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound of the pause after consecutive failing polls.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    20
}

fn default_max_attempts() -> u32 {
    10
}

fn default_max_backoff() -> u64 {
    600
}

impl Default for InvoiceRetrySettings {
    fn default() -> Self {
        InvoiceRetrySettings {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Engine Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub side_effects: SideEffectSettings,

    #[serde(default)]
    pub invoice_retry: InvoiceRetrySettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.side_effects.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "side_effects.max_concurrent must be greater than 0".into(),
            ));
        }

        if self.invoice_retry.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "invoice_retry.batch_size must be greater than 0".into(),
            ));
        }

        if self.invoice_retry.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "invoice_retry.poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.invoice_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "invoice_retry.max_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MESA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(value) = std::env::var("MESA_MAX_SIDE_EFFECTS") {
            match value.parse::<usize>() {
                Ok(n) => self.side_effects.max_concurrent = n,
                Err(_) => warn!(value = %value, "Ignoring invalid MESA_MAX_SIDE_EFFECTS"),
            }
        }

        if let Ok(value) = std::env::var("MESA_RETRY_POLL_SECS") {
            if let Ok(secs) = value.parse::<u64>() {
                debug!(secs, "Overriding invoice retry interval from environment");
                self.invoice_retry.poll_interval_secs = secs;
            }
        }

        if let Ok(value) = std::env::var("MESA_RETRY_BATCH_SIZE") {
            if let Ok(n) = value.parse::<u32>() {
                self.invoice_retry.batch_size = n;
            }
        }

        if let Ok(value) = std::env::var("MESA_RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = value.parse::<u32>() {
                self.invoice_retry.max_attempts = n;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "mesa", "mesa-pos")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pool configuration for [`mesa_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        // one shared connection, or every pooled connection gets its own database
        if self.database.path.as_os_str() == ":memory:" {
            return DbConfig::in_memory();
        }

        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_secs(self.database.busy_timeout_secs))
    }

    pub fn retry_poll_interval(&self) -> Duration {
        Duration::from_secs(self.invoice_retry.poll_interval_secs)
    }

    pub fn retry_max_backoff(&self) -> Duration {
        Duration::from_secs(self.invoice_retry.max_backoff_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.database.path, PathBuf::from("mesa.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.side_effects.max_concurrent, 8);
        assert_eq!(config.invoice_retry.batch_size, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.side_effects.max_concurrent = 0;
        assert!(config.validate().is_err());

        config.side_effects.max_concurrent = 4;
        config.invoice_retry.batch_size = 0;
        assert!(config.validate().is_err());

        config.invoice_retry.batch_size = 10;
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        config.database.max_connections = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [side_effects]
            max_concurrent = 2

            [invoice_retry]
            max_attempts = 3
        "#;

        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.side_effects.max_concurrent, 2);
        assert_eq!(config.invoice_retry.max_attempts, 3);
        assert_eq!(config.invoice_retry.poll_interval_secs, 30);
        assert_eq!(config.database.busy_timeout_secs, 5);
    }

    #[test]
    fn test_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[invoice_retry]"));

        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.side_effects.max_concurrent, config.side_effects.max_concurrent);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "[database]\npath = \"shop.db\"\nbusy_timeout_secs = 9\n").unwrap();

        let config = EngineConfig::load(Some(path)).unwrap();
        assert_eq!(config.database.busy_timeout_secs, 9);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.toml");

        let mut config = EngineConfig::default();
        config.invoice_retry.batch_size = 7;
        config.save(Some(path.clone())).unwrap();

        let loaded = EngineConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.invoice_retry.batch_size, 7);
    }
}
