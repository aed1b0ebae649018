//! CLI Commands

pub mod replan;
pub mod run;
pub mod scenarios;

use anyhow::{Context, Result};
use bobqa_common::QaConfig;
use std::path::Path;

/// Load the configuration file with environment overrides applied
pub fn load_config(path: &Path) -> Result<QaConfig> {
    let config = QaConfig::load(path)
        .with_context(|| format!("loading {}", path.display()))?
        .with_env_overrides();
    Ok(config)
}
