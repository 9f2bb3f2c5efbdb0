//! Engine configuration
//!
//! Loaded from a TOML file, with `ATRIUM_<SECTION>_<KEY>` environment
//! variables layered on top of the defaults.

use crate::core_room::RoomQuotas;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Primary store configuration
    pub store: StoreConfig,

    /// External artifact store configuration
    pub artifacts: ArtifactConfig,

    /// Default quotas applied to rooms created without explicit limits
    pub quotas: RoomQuotas,

    /// Retention sweep configuration
    pub retention: RetentionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Which primary-store adapter to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Hash maps behind a lock, nothing persisted
    Memory,
    /// Relational schema in SQLite
    Sql,
    /// One JSON document per room in SQLite
    Doc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Adapter selection
    pub backend: StoreBackend,

    /// Data directory for the SQLite-backed adapters
    pub data_dir: PathBuf,
}

/// Which blob store backs uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactBackend {
    Memory,
    Fs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Blob store selection
    pub backend: ArtifactBackend,

    /// Root directory for the filesystem blob store
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// How often the retention sweep visits each room
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Emit records as JSON lines
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sql,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            backend: ArtifactBackend::Fs,
            root: PathBuf::from("./artifacts"),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables follow the pattern `ATRIUM_<SECTION>_<KEY>`, for example
    /// `ATRIUM_STORE_BACKEND=doc`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(backend) = env::var("ATRIUM_STORE_BACKEND") {
            config.store.backend = match backend.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "sql" => StoreBackend::Sql,
                "doc" => StoreBackend::Doc,
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "unknown store backend: {other}"
                    )))
                }
            };
        }
        if let Ok(data_dir) = env::var("ATRIUM_STORE_DATA_DIR") {
            config.store.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = env::var("ATRIUM_ARTIFACTS_BACKEND") {
            config.artifacts.backend = match backend.to_lowercase().as_str() {
                "memory" => ArtifactBackend::Memory,
                "fs" => ArtifactBackend::Fs,
                other => {
                    return Err(ConfigError::InvalidValue(format!(
                        "unknown artifact backend: {other}"
                    )))
                }
            };
        }
        if let Ok(root) = env::var("ATRIUM_ARTIFACTS_ROOT") {
            config.artifacts.root = PathBuf::from(root);
        }

        if let Ok(max_users) = env::var("ATRIUM_QUOTAS_MAX_USERS") {
            config.quotas.max_users = max_users
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("invalid max_users: {e}")))?;
        }
        if let Ok(max_channels) = env::var("ATRIUM_QUOTAS_MAX_CHANNELS") {
            config.quotas.max_channels = max_channels
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("invalid max_channels: {e}")))?;
        }

        if let Ok(interval) = env::var("ATRIUM_RETENTION_SWEEP_INTERVAL") {
            config.retention.sweep_interval = humantime::parse_duration(&interval)
                .map_err(|e| ConfigError::InvalidValue(format!("invalid sweep interval: {e}")))?;
        }

        if let Ok(level) = env::var("ATRIUM_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("ATRIUM_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("invalid JSON flag: {e}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quotas.max_users == 0 {
            return Err(ConfigError::ValidationFailed(
                "quotas.max_users must be greater than 0".to_string(),
            ));
        }
        if self.quotas.max_channels == 0 {
            return Err(ConfigError::ValidationFailed(
                "quotas.max_channels must be greater than 0".to_string(),
            ));
        }
        if self.quotas.single_file_bytes_allowed > self.quotas.total_files_bytes_allowed {
            return Err(ConfigError::ValidationFailed(
                "quotas.single_file_bytes_allowed exceeds the room total".to_string(),
            ));
        }
        if self.retention.sweep_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "retention.sweep_interval must be non-zero".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }
}
