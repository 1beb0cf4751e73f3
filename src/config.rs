use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::discovery::gitlab::DEFAULT_BASE_URL;

// =============================================================================
// Time-related constants
// =============================================================================

/// Default cache entry lifetime in milliseconds (24 hours)
pub const DEFAULT_CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Timeout for a single durable write attempt in milliseconds (30 seconds)
pub const DURABLE_ATTEMPT_TIMEOUT_MS: u64 = 30_000;

/// First backoff delay between durable write attempts in milliseconds
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Attempts made for one durable write before it is left to the push sweep
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Trailing window used to judge durable-tier health (5 minutes)
pub const HEALTH_WINDOW_SECS: u64 = 5 * 60;

/// Interval of the metrics summary and push retry tasks (5 minutes)
pub const MAINTENANCE_INTERVAL_SECS: u64 = 5 * 60;

/// Timeout for one push retry sweep (2 minutes)
pub const PUSH_RETRY_TIMEOUT_SECS: u64 = 2 * 60;

/// Timeout for tag discovery requests (10 seconds)
pub const TAG_DISCOVERY_TIMEOUT_SECS: u64 = 10;

/// Environment variable overriding `tagDiscovery.accessToken`
pub const ACCESS_TOKEN_ENV: &str = "GITLAB_ACCESS_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Service configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    pub durable: DurableConfig,
    pub tag_discovery: TagDiscoveryConfig,
    pub persistence: PersistenceConfig,
    pub health: HealthConfig,
    pub lock_mode: LockMode,
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            durable: DurableConfig::default(),
            tag_discovery: TagDiscoveryConfig::default(),
            persistence: PersistenceConfig::default(),
            health: HealthConfig::default(),
            lock_mode: LockMode::default(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Cache tier configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// SQLite database file; `None` keeps the cache in memory
    pub path: Option<PathBuf>,
    /// Entry and index lifetime in milliseconds
    pub ttl_ms: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: Some(data_dir().join("cache.db")),
            ttl_ms: DEFAULT_CACHE_TTL_MS,
        }
    }
}

/// Durable tier configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DurableConfig {
    pub working_copy: PathBuf,
    pub remote: Option<PathBuf>,
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            working_copy: data_dir().join("working-copy"),
            remote: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TagDiscoveryConfig {
    pub enabled: bool,
    pub base_url: String,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TagDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: None,
            timeout_secs: TAG_DISCOVERY_TIMEOUT_SECS,
        }
    }
}

/// Background durable write settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistenceConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub attempt_timeout_ms: u64,
    /// Number of durable write workers
    pub workers: usize,
    /// Pending writes each worker accepts before `save` waits
    pub queue_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_WRITE_ATTEMPTS,
            base_delay_ms: RETRY_BASE_DELAY_MS,
            attempt_timeout_ms: DURABLE_ATTEMPT_TIMEOUT_MS,
            workers: 4,
            queue_capacity: 256,
        }
    }
}

impl PersistenceConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthConfig {
    pub window_secs: u64,
    pub maintenance_interval_secs: u64,
    pub push_retry_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_secs: HEALTH_WINDOW_SECS,
            maintenance_interval_secs: MAINTENANCE_INTERVAL_SECS,
            push_retry_timeout_secs: PUSH_RETRY_TIMEOUT_SECS,
        }
    }
}

impl HealthConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn push_retry_timeout(&self) -> Duration {
        Duration::from_secs(self.push_retry_timeout_secs)
    }
}

/// Scope of the lock serializing increments
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// One lock shared by every identifier
    Global,
    /// One lock per identifier, created on demand
    #[default]
    PerIdentifier,
}

impl ServiceConfig {
    /// Load configuration from `path`, or from the default location when it
    /// exists, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = config_path();
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_path.exists().then_some(default_path),
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            config.apply_access_token(token);
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_access_token(&mut self, token: String) {
        if !token.is_empty() {
            self.tag_discovery.access_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.durable.remote.is_none() {
            return Err(ConfigError::Invalid("durable.remote is required".to_string()));
        }
        if self.persistence.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "persistence.maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.persistence.workers == 0 || self.persistence.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "persistence.workers and persistence.queueCapacity must be at least 1"
                    .to_string(),
            ));
        }
        if self.cache.ttl_ms <= 0 {
            return Err(ConfigError::Invalid("cache.ttlMs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Returns the path to the data directory for version-service.
/// Uses $XDG_DATA_HOME/version-service if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/version-service,
/// or ./version-service if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the default config file.
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("version-service.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("version-service")
}
