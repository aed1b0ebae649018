//! bobqa Common Library
//!
//! Shared run records, configuration and business rules for the bobqa
//! browser and backend probes.

pub mod config;
pub mod error;
pub mod replan;
pub mod types;

// Re-export commonly used types
pub use config::{QaConfig, SecretRef};
pub use error::{Error, Result};
pub use types::*;

/// bobqa version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file path, relative to the working directory
pub fn default_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from("bobqa.toml")
}
