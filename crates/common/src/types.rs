//! Run records shared by the browser and backend probes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Outcome status of a single test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Skip => write!(f, "SKIP"),
        }
    }
}

/// Completed test case. Built once with every field populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub status: TestStatus,
    pub duration_secs: f64,
    pub message: String,
    pub screenshot_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TestOutcome {
    pub fn new(
        name: impl Into<String>,
        status: TestStatus,
        duration: Duration,
        message: impl Into<String>,
        screenshot_path: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            duration_secs: duration.as_secs_f64(),
            message: message.into(),
            screenshot_path,
            timestamp: Utc::now(),
        }
    }
}

/// Defect severity, ordered so that `Critical` compares greatest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
    #[serde(alias = "critical")]
    Critical,
}

impl Severity {
    /// All levels, most severe first
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Severity::Critical),
            "HIGH" => Ok(Severity::High),
            "MEDIUM" => Ok(Severity::Medium),
            "LOW" => Ok(Severity::Low),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Unexpected UI or state condition observed during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    pub severity: Severity,
    /// Short machine-readable tag, e.g. `ELEMENT_NOT_FOUND`
    pub category: String,
    pub message: String,
    pub url: String,
    pub screenshot_path: Option<String>,
    pub console_logs: Vec<String>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Run metadata fixed at run start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub suite: String,
    pub target_url: String,
    pub browser: String,
    pub headless: bool,
    pub started_at: DateTime<Utc>,
}

impl RunMetadata {
    pub fn new(suite: impl Into<String>, target_url: impl Into<String>, browser: impl Into<String>, headless: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            suite: suite.into(),
            target_url: target_url.into(),
            browser: browser.into(),
            headless,
            started_at: Utc::now(),
        }
    }
}

/// Defect counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total: usize,
}

impl DefectCounts {
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }
}

/// Counts derived from a finished run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// passed / total, 0.0 for an empty run
    pub success_rate: f64,
    pub defects: DefectCounts,
}

/// Closing recommendation, chosen by the highest severity present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    ImmediateAttention,
    AddressBeforeRelease,
    AddressNextSprint,
    OptionalCleanup,
    AllClear,
}

impl Recommendation {
    pub fn for_highest(highest: Option<Severity>) -> Self {
        match highest {
            Some(Severity::Critical) => Recommendation::ImmediateAttention,
            Some(Severity::High) => Recommendation::AddressBeforeRelease,
            Some(Severity::Medium) => Recommendation::AddressNextSprint,
            Some(Severity::Low) => Recommendation::OptionalCleanup,
            None => Recommendation::AllClear,
        }
    }

    pub fn line(&self) -> &'static str {
        match self {
            Recommendation::ImmediateAttention => {
                "🔴 **CRITICAL ISSUES FOUND** - Platform may not be functional. Immediate attention required."
            }
            Recommendation::AddressBeforeRelease => {
                "🟠 **HIGH PRIORITY ISSUES** - Core functionality impacted. Address before release."
            }
            Recommendation::AddressNextSprint => {
                "🟡 **MEDIUM PRIORITY ISSUES** - User experience affected. Address next sprint."
            }
            Recommendation::OptionalCleanup => {
                "🟢 **LOW PRIORITY ISSUES** - Optional cleanup available."
            }
            Recommendation::AllClear => "🎉 **NO DEFECTS FOUND** - All clear.",
        }
    }
}

/// Finalized run. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    metadata: RunMetadata,
    finished_at: DateTime<Utc>,
    outcomes: Vec<TestOutcome>,
    defects: Vec<Defect>,
}

impl TestRun {
    pub fn new(
        metadata: RunMetadata,
        finished_at: DateTime<Utc>,
        outcomes: Vec<TestOutcome>,
        defects: Vec<Defect>,
    ) -> Self {
        Self {
            metadata,
            finished_at,
            outcomes,
            defects,
        }
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Outcomes in detection order
    pub fn outcomes(&self) -> &[TestOutcome] {
        &self.outcomes
    }

    /// Defects in detection order
    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    pub fn duration_secs(&self) -> f64 {
        let millis = (self.finished_at - self.metadata.started_at).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }

    pub fn summary(&self) -> RunSummary {
        let count = |status: TestStatus| self.outcomes.iter().filter(|o| o.status == status).count();
        let total = self.outcomes.len();
        let passed = count(TestStatus::Pass);

        let mut defects = DefectCounts::default();
        for defect in &self.defects {
            match defect.severity {
                Severity::Critical => defects.critical += 1,
                Severity::High => defects.high += 1,
                Severity::Medium => defects.medium += 1,
                Severity::Low => defects.low += 1,
            }
            defects.total += 1;
        }

        RunSummary {
            total,
            passed,
            failed: count(TestStatus::Fail),
            skipped: count(TestStatus::Skip),
            success_rate: if total == 0 { 0.0 } else { passed as f64 / total as f64 },
            defects,
        }
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.defects.iter().map(|d| d.severity).max()
    }

    pub fn recommendation(&self) -> Recommendation {
        Recommendation::for_highest(self.highest_severity())
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.status == TestStatus::Fail)
    }

    /// Defects of one severity, in detection order
    pub fn defects_with(&self, severity: Severity) -> impl Iterator<Item = &Defect> {
        self.defects.iter().filter(move |d| d.severity == severity)
    }
}
