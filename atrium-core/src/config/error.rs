//! Configuration error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file: {0}")]
    Io(String),

    #[error("could not parse configuration: {0}")]
    Parse(String),

    #[error("could not serialize configuration: {0}")]
    Serialize(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}
