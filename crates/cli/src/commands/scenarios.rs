//! Scenario listing

use anyhow::{Context, Result};
use bobqa_e2e::ScenarioSpec;
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::load_config;
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ScenariosArgs {
    /// Scenario directory (defaults to output.scenarios_dir)
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    /// Only list scenarios with this tag
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Serialize)]
pub struct ScenarioInfo {
    pub name: String,
    pub tags: Vec<String>,
    pub steps: usize,
    pub skip: bool,
    pub description: String,
}

impl From<&ScenarioSpec> for ScenarioInfo {
    fn from(spec: &ScenarioSpec) -> Self {
        Self {
            name: spec.name.clone(),
            tags: spec.tags.clone(),
            steps: spec.steps.len(),
            skip: spec.skip,
            description: spec.description.clone(),
        }
    }
}

impl TableDisplay for ScenarioInfo {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Tags", "Steps", "Skip", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.tags.join(", "),
            self.steps.to_string(),
            if self.skip { "yes".to_string() } else { String::new() },
            self.description.clone(),
        ]
    }
}

pub fn execute(args: ScenariosArgs, config_path: &Path, format: OutputFormat) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let dir = args.scenarios.unwrap_or(config.output.scenarios_dir);

    let specs = ScenarioSpec::load_all(&dir)
        .with_context(|| format!("loading scenarios from {}", dir.display()))?;
    let infos: Vec<ScenarioInfo> = match &args.tag {
        Some(tag) => ScenarioSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .map(ScenarioInfo::from)
            .collect(),
        None => specs.iter().map(ScenarioInfo::from).collect(),
    };

    print_list(&infos, format);
    Ok(ExitCode::SUCCESS)
}
