//! Scenario run command

use anyhow::{Context, Result};
use bobqa_common::config::BrowserEngine;
use bobqa_common::{QaConfig, RunMetadata, Severity, TestRun};
use bobqa_e2e::{
    run_guarded, select_scenarios, E2eError, Recorder, ReportEmitter, ReportPaths, ScenarioRunner, ScenarioSpec,
    WebDriverPage,
};
use clap::{Args, ValueEnum};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use super::load_config;
use crate::output::{
    new_table, print_error, print_heading, print_json, print_success, print_warning, severity_cell, status_cell,
    OutputFormat,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EngineArg {
    Chrome,
    Firefox,
}

impl From<EngineArg> for BrowserEngine {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Chrome => BrowserEngine::Chrome,
            EngineArg::Firefox => BrowserEngine::Firefox,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Scenario directory (defaults to output.scenarios_dir)
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    /// Only run scenarios with this tag
    #[arg(long)]
    pub tag: Option<String>,

    /// Run a single scenario by name
    #[arg(long)]
    pub name: Option<String>,

    /// Browser engine
    #[arg(long, value_enum)]
    pub browser: Option<EngineArg>,

    /// Show the browser window
    #[arg(long)]
    pub visible: bool,

    /// Persona for scenarios that do not name one
    #[arg(long)]
    pub persona: Option<String>,

    /// Report directory (screenshots go to <DIR>/screenshots)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, config: &mut QaConfig) {
        if let Some(engine) = self.browser {
            config.browser.engine = engine.into();
        }
        if self.visible {
            config.browser.headless = false;
        }
        if let Some(persona) = &self.persona {
            config.target.default_persona = persona.clone();
        }
        if let Some(dir) = &self.scenarios {
            config.output.scenarios_dir = dir.clone();
        }
        if let Some(dir) = &self.output {
            config.output.reports_dir = dir.clone();
            config.output.screenshot_dir = dir.join("screenshots");
        }
    }

    fn suite_name(&self) -> String {
        match (&self.name, &self.tag) {
            (Some(name), _) => name.clone(),
            (None, Some(tag)) => tag.clone(),
            (None, None) => "all".to_string(),
        }
    }
}

#[derive(Serialize)]
struct RunResult<'a> {
    run_id: String,
    success: bool,
    summary: bobqa_common::RunSummary,
    recommendation: &'static str,
    json_report: &'a Path,
    markdown_report: &'a Path,
    fatal: Option<String>,
}

pub async fn execute(args: RunArgs, config_path: &Path, format: OutputFormat) -> Result<ExitCode> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    let specs = ScenarioSpec::load_all(&config.output.scenarios_dir)
        .with_context(|| format!("loading scenarios from {}", config.output.scenarios_dir.display()))?;
    let specs = select_scenarios(specs, args.tag.as_deref(), args.name.as_deref())?;
    if specs.is_empty() {
        print_warning("No scenarios selected");
    }

    let metadata = RunMetadata::new(
        args.suite_name(),
        config.target.base_url.clone(),
        config.browser.engine.as_str(),
        config.browser.headless,
    );
    let run_tag = metadata.run_id.simple().to_string()[..8].to_string();
    let mut recorder = Recorder::new(metadata, config.output.screenshot_dir.clone());

    let fatal = match drive(&config, &run_tag, &mut recorder, &specs).await {
        Ok(()) => None,
        Err(e) => {
            error!("Run aborted: {}", e);
            recorder
                .record_defect::<WebDriverPage>(
                    None,
                    Severity::Critical,
                    "DRIVER_FAILURE",
                    &e.to_string(),
                    json!({ "webdriver_url": config.browser.webdriver_url }),
                )
                .await;
            Some(e.to_string())
        }
    };

    let run = recorder.finish();
    let emitter = ReportEmitter::new(&config.output.reports_dir, config.output.report_prefix.clone());
    let paths = emitter.emit(&run).context("writing reports")?;

    print_run(&run, &paths, fatal.as_deref(), format);

    Ok(ExitCode::from(exit_code(&run, fatal.is_some())))
}

/// 2 when the run was aborted, 1 when any scenario failed, else 0
fn exit_code(run: &TestRun, fatal: bool) -> u8 {
    if fatal {
        2
    } else if run.has_failures() {
        1
    } else {
        0
    }
}

/// Start a session and run every scenario; the session is always closed
async fn drive(
    config: &QaConfig,
    run_tag: &str,
    recorder: &mut Recorder,
    specs: &[ScenarioSpec],
) -> Result<(), E2eError> {
    let page = WebDriverPage::connect(&config.browser).await?;
    let runner = ScenarioRunner::new(config, run_tag);
    info!("Run tag: {}", run_tag);

    run_guarded(page, |page| async move { runner.run_all(&*page, recorder, specs).await }).await
}

fn print_run(run: &TestRun, paths: &ReportPaths, fatal: Option<&str>, format: OutputFormat) {
    let summary = run.summary();

    if let OutputFormat::Json = format {
        print_json(&RunResult {
            run_id: run.metadata().run_id.to_string(),
            success: fatal.is_none() && !run.has_failures(),
            summary,
            recommendation: run.recommendation().line(),
            json_report: &paths.json,
            markdown_report: &paths.markdown,
            fatal: fatal.map(str::to_string),
        });
        return;
    }

    let mut table = new_table(vec!["Test", "Status", "Duration", "Message"]);
    for outcome in run.outcomes() {
        table.add_row(vec![
            outcome.name.clone(),
            status_cell(outcome.status).to_string(),
            format!("{:.2}s", outcome.duration_secs),
            outcome.message.clone(),
        ]);
    }
    println!("{table}");

    print_heading("Defects");
    let counts: Vec<String> = Severity::ALL
        .iter()
        .map(|s| severity_cell(*s, summary.defects.get(*s)).to_string())
        .collect();
    println!("  {}", counts.join("  "));

    print_heading("Summary");
    println!(
        "  {} passed, {} failed, {} skipped ({:.1}%) in {:.2}s",
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.success_rate * 100.0,
        run.duration_secs()
    );
    println!("  {}", run.recommendation().line());
    println!();
    println!("  Report:  {}", paths.json.display());
    println!("  Summary: {}", paths.markdown.display());
    println!();

    match fatal {
        Some(reason) => print_error(&format!("Run aborted: {}", reason)),
        None if run.has_failures() => print_error("Some scenarios failed"),
        None => print_success("All scenarios passed"),
    }
}
