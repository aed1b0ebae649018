//! Declarative YAML scenarios

use bobqa_common::Severity;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::form::{FieldKind, FormField};
use crate::locator::{Cascade, Strategy};

/// A scenario parsed from YAML. Produces one test outcome when run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Persona used by `login` steps that do not name one
    #[serde(default)]
    pub persona: Option<String>,

    /// Report as SKIP without running
    #[serde(default)]
    pub skip: bool,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

/// A single scenario step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Side-door login, then wait for the signed-in shell
    Login {
        #[serde(default)]
        persona: Option<String>,
    },

    /// Load a route relative to the base URL
    Navigate {
        route: String,
        /// Element that marks the page as ready
        #[serde(default)]
        ready: Vec<Strategy>,
    },

    /// Click a target; without strategies the button cascade for `target` is used
    Click {
        target: String,
        #[serde(default)]
        strategies: Vec<Strategy>,
        #[serde(default)]
        severity: Option<Severity>,
    },

    /// Fill form fields
    Fill {
        fields: Vec<FieldSpec>,
        /// Fail the scenario unless every field is filled
        #[serde(default)]
        required: bool,
    },

    /// Wait until the page text contains `text`
    ExpectText {
        text: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        severity: Option<Severity>,
    },

    /// Wait until a target is present
    ExpectVisible {
        target: String,
        #[serde(default)]
        strategies: Vec<Strategy>,
        #[serde(default)]
        severity: Option<Severity>,
    },

    /// Save a screenshot
    Screenshot { name: String },

    /// Fixed wait, for pages with no usable readiness signal
    Sleep { ms: u64 },

    /// Log a message
    Log { message: String },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Login { .. } => "login",
            Step::Navigate { .. } => "navigate",
            Step::Click { .. } => "click",
            Step::Fill { .. } => "fill",
            Step::ExpectText { .. } => "expect_text",
            Step::ExpectVisible { .. } => "expect_visible",
            Step::Screenshot { .. } => "screenshot",
            Step::Sleep { .. } => "sleep",
            Step::Log { .. } => "log",
        }
    }
}

/// Field entry of a `fill` step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub kind: FieldKind,
    /// Overrides the default field cascade when present
    #[serde(default)]
    pub strategies: Vec<Strategy>,
}

impl FieldSpec {
    /// Form field with `{run}` in the value replaced by `run_tag`
    pub fn to_field(&self, run_tag: &str) -> FormField {
        let cascade = cascade_or(&self.strategies, || Cascade::for_field(&self.name));
        FormField {
            name: self.name.clone(),
            value: expand(&self.value, run_tag),
            kind: self.kind,
            cascade,
        }
    }
}

/// Cascade from explicit strategies, falling back to `default`
pub(crate) fn cascade_or(strategies: &[Strategy], default: impl FnOnce() -> Cascade) -> Cascade {
    Cascade::new(strategies.to_vec()).unwrap_or_else(|_| default())
}

/// Replace the `{run}` placeholder
pub fn expand(value: &str, run_tag: &str) -> String {
    value.replace("{run}", run_tag)
}

impl ScenarioSpec {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| E2eError::SpecParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Load all scenarios under a directory, sorted by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path()
                        .extension()
                        .map(|ext| ext == "yaml" || ext == "yml")
                        .unwrap_or(false)
            })
        {
            specs.push(Self::from_file(entry.path())?);
        }

        Ok(specs)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }
}
