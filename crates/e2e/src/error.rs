//! Error types for UI probing

use thiserror::Error;

/// Failure reported by a browser backend.
///
/// `Interaction` failures concern one element or query and are recorded
/// as outcomes or defects. `Transport` failures mean the session itself is
/// gone and abort the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Browser transport failure: {0}")]
    Transport(String),

    #[error("Browser interaction failed: {0}")]
    Interaction(String),
}

impl DriverError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Transport(_))
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("WebDriver session could not be started at {url}: {reason}")]
    SessionStart { url: String, reason: String },

    #[error("Locator cascade must contain at least one strategy")]
    EmptyCascade,

    #[error("Invalid locator strategy: {0}")]
    InvalidStrategy(String),

    #[error("Scenario parse error in {path}: {reason}")]
    SpecParse { path: String, reason: String },

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Interrupted")]
    Interrupted,

    #[error(transparent)]
    Config(#[from] bobqa_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl E2eError {
    /// Whether the run must stop
    pub fn is_fatal(&self) -> bool {
        match self {
            E2eError::Driver(e) => e.is_fatal(),
            _ => true,
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
