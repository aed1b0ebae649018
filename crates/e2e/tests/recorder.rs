mod support;

use bobqa_common::{RunMetadata, Severity};
use bobqa_e2e::{Page, Recorder};
use serde_json::json;
use support::FakePage;

fn recorder(dir: &std::path::Path) -> Recorder {
    let meta = RunMetadata::new("defects", "http://127.0.0.1:3000", "chrome", true);
    Recorder::new(meta, dir.join("screenshots"))
}

#[tokio::test]
async fn test_defect_recorded_when_diagnostics_fail() {
    let dir = tempfile::tempdir().unwrap();
    let page = FakePage::new();
    page.goto("http://127.0.0.1:3000/goals").await.unwrap();
    page.push_console("error", "Uncaught TypeError");
    page.fail_screenshots();
    page.fail_console();

    let mut recorder = recorder(dir.path());
    let defect = recorder
        .record_defect(
            Some(&page),
            Severity::High,
            "ELEMENT_NOT_FOUND",
            "create button missing",
            json!({ "target": "create goal" }),
        )
        .await;

    assert_eq!(defect.url, "http://127.0.0.1:3000/goals");
    assert!(defect.screenshot_path.is_none());
    assert!(defect.console_logs.is_empty());
    assert_eq!(defect.details["target"], "create goal");

    let run = recorder.finish();
    assert_eq!(run.defects().len(), 1);
    assert_eq!(run.defects()[0].severity, Severity::High);
    assert!(!dir.path().join("screenshots").exists());
}

#[tokio::test]
async fn test_defect_keeps_only_problem_console_lines() {
    let dir = tempfile::tempdir().unwrap();
    let page = FakePage::new();
    page.push_console("info", "loaded");
    page.push_console("warning", "deprecated prop");
    page.push_console("SEVERE", "500 from /api/goals");

    let mut recorder = recorder(dir.path());
    let defect = recorder
        .record_defect(Some(&page), Severity::Medium, "INPUT_ERROR", "rejected", json!({}))
        .await;

    assert_eq!(
        defect.console_logs,
        vec!["[WARNING] deprecated prop".to_string(), "[SEVERE] 500 from /api/goals".to_string()]
    );
    let shot = defect.screenshot_path.clone().unwrap();
    assert!(shot.contains("INPUT_ERROR_"));
    assert!(std::path::Path::new(&shot).exists());
}
