//! Error types for bobqa

use thiserror::Error;

/// Result type alias using bobqa Error
pub type Result<T> = std::result::Result<T, Error>;

/// bobqa error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Secret not available: environment variable {0} is not set")]
    MissingSecret(String),
}
