//! Outcome and defect bookkeeping for one run

use bobqa_common::{Defect, RunMetadata, Severity, TestOutcome, TestRun, TestStatus};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::driver::Page;

/// Accumulates evidence in detection order.
///
/// Diagnostic capture (screenshot, console) is best-effort and never fails
/// a recording call.
pub struct Recorder {
    metadata: RunMetadata,
    screenshot_dir: PathBuf,
    outcomes: Vec<TestOutcome>,
    defects: Vec<Defect>,
}

impl Recorder {
    pub fn new(metadata: RunMetadata, screenshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            metadata,
            screenshot_dir: screenshot_dir.into(),
            outcomes: Vec::new(),
            defects: Vec::new(),
        }
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    pub fn record_outcome(
        &mut self,
        name: &str,
        status: TestStatus,
        duration: Duration,
        message: &str,
        screenshot_path: Option<String>,
    ) -> &TestOutcome {
        match status {
            TestStatus::Pass => info!("✓ {} ({:.2}s)", name, duration.as_secs_f64()),
            TestStatus::Fail => error!("✗ {} - {}", name, message),
            TestStatus::Skip => info!("- {} (skipped)", name),
        }
        self.outcomes
            .push(TestOutcome::new(name, status, duration, message, screenshot_path));
        &self.outcomes[self.outcomes.len() - 1]
    }

    /// Record a defect. With a page, the defect also carries its URL, a
    /// screenshot and recent warning/error console lines.
    pub async fn record_defect<P>(
        &mut self,
        page: Option<&P>,
        severity: Severity,
        category: &str,
        message: &str,
        details: serde_json::Value,
    ) -> &Defect
    where
        P: Page + ?Sized,
    {
        let (url, screenshot_path, console_logs) = match page {
            Some(page) => {
                let url = match page.current_url().await {
                    Ok(url) => url,
                    Err(e) => {
                        warn!("Could not read page URL for defect: {}", e);
                        String::new()
                    }
                };
                let screenshot_path = self.capture_screenshot(page, category).await;
                let console_logs = match page.console_entries().await {
                    Ok(entries) => entries
                        .iter()
                        .filter(|e| e.is_problem())
                        .map(ToString::to_string)
                        .collect(),
                    Err(e) => {
                        warn!("Could not read console for defect: {}", e);
                        Vec::new()
                    }
                };
                (url, screenshot_path, console_logs)
            }
            None => (String::new(), None, Vec::new()),
        };

        self.push_defect(Defect {
            severity,
            category: category.to_string(),
            message: message.to_string(),
            url,
            screenshot_path,
            console_logs,
            details,
            timestamp: Utc::now(),
        })
    }

    fn push_defect(&mut self, defect: Defect) -> &Defect {
        warn!("[{}] {}: {}", defect.severity, defect.category, defect.message);
        self.defects.push(defect);
        &self.defects[self.defects.len() - 1]
    }

    /// Save a screenshot as `<name>_<timestamp>.png`; `None` if anything fails
    pub async fn capture_screenshot<P>(&self, page: &P, name: &str) -> Option<String>
    where
        P: Page + ?Sized,
    {
        let bytes = match page.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Screenshot '{}' failed: {}", name, e);
                return None;
            }
        };

        let file = format!(
            "{}_{}.png",
            sanitize(name),
            Utc::now().format("%Y%m%d_%H%M%S%3f")
        );
        let path = self.screenshot_dir.join(file);
        match write_file(&path, &bytes) {
            Ok(()) => {
                debug!("Screenshot saved: {}", path.display());
                Some(path.to_string_lossy().into_owned())
            }
            Err(e) => {
                warn!("Could not save screenshot {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Finalize the run
    pub fn finish(self) -> TestRun {
        TestRun::new(self.metadata, Utc::now(), self.outcomes, self.defects)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_file_names_flat() {
        assert_eq!(sanitize("goals/create form"), "goals_create_form");
        assert_eq!(sanitize("ELEMENT_NOT_FOUND"), "ELEMENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_pageless_defect_and_finish() {
        let meta = RunMetadata::new("unit", "http://localhost", "chrome", true);
        let mut recorder = Recorder::new(meta, "unused");
        recorder.record_outcome("first", TestStatus::Pass, Duration::from_millis(5), "", None);
        let defect = recorder
            .record_defect::<crate::WebDriverPage>(
                None,
                Severity::Low,
                "COSMETIC",
                "misaligned",
                serde_json::json!({ "px": 3 }),
            )
            .await;
        assert!(defect.url.is_empty());
        assert!(defect.screenshot_path.is_none());

        let run = recorder.finish();
        assert_eq!(run.outcomes().len(), 1);
        assert_eq!(run.defects()[0].details["px"], 3);
        assert!(run.finished_at() >= run.metadata().started_at);
    }
}
