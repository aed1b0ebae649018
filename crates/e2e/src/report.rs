//! JSON and Markdown run reports

use bobqa_common::{Defect, RunSummary, Severity, TestOutcome, TestRun};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::E2eResult;

/// Paths of the two files written for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

#[derive(Debug, Serialize)]
struct ReportMetadata<'a> {
    run_id: Uuid,
    suite: &'a str,
    target_url: &'a str,
    browser: &'a str,
    headless: bool,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_secs: f64,
}

#[derive(Debug, Serialize)]
struct ReportDocument<'a> {
    generated_at: DateTime<Utc>,
    metadata: ReportMetadata<'a>,
    summary: RunSummary,
    outcomes: &'a [TestOutcome],
    defects: &'a [Defect],
}

/// Writes reports into one directory
pub struct ReportEmitter {
    reports_dir: PathBuf,
    prefix: String,
}

impl ReportEmitter {
    pub fn new(reports_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Write both reports, stamped with the current time
    pub fn emit(&self, run: &TestRun) -> E2eResult<ReportPaths> {
        let generated_at = Utc::now();
        std::fs::create_dir_all(&self.reports_dir)?;

        let paths = self.free_paths(generated_at);
        let json = serde_json::to_string_pretty(&render_json(run, generated_at))?;
        let markdown = render_markdown(run, generated_at);

        write_pair(&paths, json.as_bytes(), markdown.as_bytes())?;

        info!("Report written: {}", paths.json.display());
        info!("Summary written: {}", paths.markdown.display());
        Ok(paths)
    }

    fn free_paths(&self, generated_at: DateTime<Utc>) -> ReportPaths {
        let stem = format!(
            "{}_{}",
            self.prefix,
            generated_at.format("%Y-%m-%dT%H-%M-%S%.3f")
        );
        let mut suffix = 0usize;
        loop {
            let name = if suffix == 0 {
                stem.clone()
            } else {
                format!("{stem}_{suffix}")
            };
            let paths = ReportPaths {
                json: self.reports_dir.join(format!("{name}.json")),
                markdown: self.reports_dir.join(format!("{name}.md")),
            };
            if !paths.json.exists() && !paths.markdown.exists() {
                return paths;
            }
            suffix += 1;
        }
    }
}

/// Stage in the target directory, then rename into place
/// Write both reports or neither. Contents are staged next to their
/// targets and only persisted once both are on disk.
fn write_pair(paths: &ReportPaths, json: &[u8], markdown: &[u8]) -> E2eResult<()> {
    let json_tmp = stage(&paths.json, json)?;
    let markdown_tmp = stage(&paths.markdown, markdown)?;

    json_tmp.persist_noclobber(&paths.json).map_err(|e| e.error)?;
    if let Err(e) = markdown_tmp.persist_noclobber(&paths.markdown) {
        if let Err(cleanup) = std::fs::remove_file(&paths.json) {
            warn!("Could not remove {}: {}", paths.json.display(), cleanup);
        }
        return Err(e.error.into());
    }
    Ok(())
}

fn stage(path: &Path, bytes: &[u8]) -> E2eResult<tempfile::NamedTempFile> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Structured report document
pub fn render_json(run: &TestRun, generated_at: DateTime<Utc>) -> serde_json::Value {
    let meta = run.metadata();
    let doc = ReportDocument {
        generated_at,
        metadata: ReportMetadata {
            run_id: meta.run_id,
            suite: &meta.suite,
            target_url: &meta.target_url,
            browser: &meta.browser,
            headless: meta.headless,
            started_at: meta.started_at,
            finished_at: run.finished_at(),
            duration_secs: run.duration_secs(),
        },
        summary: run.summary(),
        outcomes: run.outcomes(),
        defects: run.defects(),
    };
    // Plain data with string keys; cannot fail
    serde_json::to_value(&doc).unwrap_or(serde_json::Value::Null)
}

fn stamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Human-readable summary document
pub fn render_markdown(run: &TestRun, generated_at: DateTime<Utc>) -> String {
    let meta = run.metadata();
    let summary = run.summary();
    let mut md = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(md, "# BOB QA Report: {}", meta.suite);
    let _ = writeln!(md);
    let _ = writeln!(md, "**Generated:** {}", stamp(generated_at));
    let _ = writeln!(md, "**Run ID:** {}", meta.run_id);
    let _ = writeln!(md);

    let _ = writeln!(md, "## Summary");
    let _ = writeln!(md);
    let _ = writeln!(md, "- **Total Tests:** {}", summary.total);
    let _ = writeln!(md, "- **Passed:** {}", summary.passed);
    let _ = writeln!(md, "- **Failed:** {}", summary.failed);
    let _ = writeln!(md, "- **Skipped:** {}", summary.skipped);
    let _ = writeln!(md, "- **Success Rate:** {:.1}%", summary.success_rate * 100.0);
    let _ = writeln!(md, "- **Duration:** {:.2}s", run.duration_secs());
    let _ = writeln!(md);

    let _ = writeln!(md, "## Defect Summary");
    let _ = writeln!(md);
    for severity in Severity::ALL {
        let _ = writeln!(md, "- **{}:** {}", severity, summary.defects.get(severity));
    }
    let _ = writeln!(md, "- **Total:** {}", summary.defects.total);
    let _ = writeln!(md);

    let _ = writeln!(md, "## Environment");
    let _ = writeln!(md);
    let _ = writeln!(md, "- **Target:** {}", meta.target_url);
    let _ = writeln!(md, "- **Browser:** {}", meta.browser);
    let _ = writeln!(md, "- **Headless:** {}", meta.headless);
    let _ = writeln!(md, "- **Started:** {}", stamp(meta.started_at));
    let _ = writeln!(md, "- **Finished:** {}", stamp(run.finished_at()));
    let _ = writeln!(md);

    for severity in Severity::ALL {
        let _ = writeln!(md, "## {} Defects", severity);
        let _ = writeln!(md);
        let mut any = false;
        for (i, defect) in run.defects_with(severity).enumerate() {
            any = true;
            write_defect(&mut md, i + 1, defect);
        }
        if !any {
            let _ = writeln!(md, "No {} issues found.", severity.as_str().to_lowercase());
            let _ = writeln!(md);
        }
    }

    let _ = writeln!(md, "## Test Results");
    let _ = writeln!(md);
    if run.outcomes().is_empty() {
        let _ = writeln!(md, "No tests were recorded.");
    } else {
        let _ = writeln!(md, "| Test | Status | Duration | Message |");
        let _ = writeln!(md, "|------|--------|----------|---------|");
        for outcome in run.outcomes() {
            let _ = writeln!(
                md,
                "| {} | {} | {:.2}s | {} |",
                escape_cell(&outcome.name),
                outcome.status,
                outcome.duration_secs,
                escape_cell(&outcome.message)
            );
        }
    }
    let _ = writeln!(md);

    let _ = writeln!(md, "## Recommendation");
    let _ = writeln!(md);
    let _ = writeln!(md, "{}", run.recommendation().line());

    md
}

fn write_defect(md: &mut String, n: usize, defect: &Defect) {
    let _ = writeln!(md, "### {}. {}", n, defect.category);
    let _ = writeln!(md);
    let _ = writeln!(md, "- **Message:** {}", defect.message);
    let _ = writeln!(md, "- **Timestamp:** {}", stamp(defect.timestamp));
    if !defect.url.is_empty() {
        let _ = writeln!(md, "- **URL:** {}", defect.url);
    }
    if let Some(path) = &defect.screenshot_path {
        let _ = writeln!(md, "- **Screenshot:** {}", path);
    }
    if !defect.console_logs.is_empty() {
        let _ = writeln!(md, "- **Console:**");
        for line in defect.console_logs.iter().take(3) {
            let _ = writeln!(md, "  - `{}`", line.replace('`', "'"));
        }
    }
    if !defect.details.is_null() {
        let _ = writeln!(md, "- **Details:** `{}`", defect.details);
    }
    let _ = writeln!(md);
}
