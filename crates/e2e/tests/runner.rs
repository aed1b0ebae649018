mod support;

use bobqa_common::{RunMetadata, Severity, TestStatus};
use bobqa_e2e::{E2eError, Recorder, ScenarioRunner, ScenarioSpec, Strategy};
use support::{fast_config, FakePage, Node};

fn recorder(dir: &std::path::Path) -> Recorder {
    Recorder::new(RunMetadata::new("runner", "http://127.0.0.1:3000", "fake", true), dir)
}

fn scenario(yaml: &str) -> ScenarioSpec {
    ScenarioSpec::from_yaml(yaml).unwrap()
}

fn signed_in_page() -> FakePage {
    let page = FakePage::new();
    page.add(&Strategy::css(".sidebar"), Node::default());
    page
}

const CREATE_GOAL: &str = r#"
name: goals-create
steps:
  - action: login
  - action: navigate
    route: /goals
    ready: ["testid:goals-page"]
  - action: click
    target: Add Goal
  - action: fill
    required: true
    fields:
      - name: title
        value: "Demo Goal {run}"
  - action: click
    target: Save
  - action: expect_text
    text: "Demo Goal {run}"
"#;

#[tokio::test]
async fn test_goal_scenario_passes() {
    let page = signed_in_page();
    page.add(&Strategy::test_id("goals-page"), Node::default());
    let add = page.add(&Strategy::test_id("add-goal"), Node::button("Add Goal"));
    let save = page.add(&Strategy::text("Save"), Node::button("Save"));
    let title = page.add(&Strategy::name("title"), Node::input());
    page.set_body("Goals\nDemo Goal r42\n");

    let shots = tempfile::tempdir().unwrap();
    let config = fast_config();
    let mut rec = recorder(shots.path());
    let status = ScenarioRunner::new(&config, "r42")
        .run_scenario(&page, &mut rec, &scenario(CREATE_GOAL))
        .await
        .unwrap();

    assert_eq!(status, TestStatus::Pass);
    assert!(rec.defects().is_empty());
    assert_eq!(page.clicks_of(add), 1);
    assert_eq!(page.clicks_of(save), 1);
    assert_eq!(page.value_of(title), "Demo Goal r42");
    assert_eq!(
        page.navigations(),
        vec![
            "http://127.0.0.1:3000/?test-login=ai-agent-token&test-mode=true".to_string(),
            "http://127.0.0.1:3000/goals".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_failing_step_stops_scenario_but_not_run() {
    let page = signed_in_page();
    page.set_body("Stories");
    let specs = vec![
        scenario(
            r#"
name: stories-add
steps:
  - action: click
    target: Add Story
  - action: log
    message: never reached
  - action: navigate
    route: /unreached
"#,
        ),
        scenario(
            r#"
name: stories-list
steps:
  - action: expect_text
    text: Stories
"#,
        ),
    ];

    let shots = tempfile::tempdir().unwrap();
    let config = fast_config();
    let mut rec = recorder(shots.path());
    ScenarioRunner::new(&config, "x")
        .run_all(&page, &mut rec, &specs)
        .await
        .unwrap();

    let outcomes = rec.outcomes();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].status, TestStatus::Fail);
    assert!(outcomes[0].message.starts_with("step 1 (click)"));
    assert!(outcomes[0].screenshot_path.is_some());
    assert_eq!(outcomes[1].status, TestStatus::Pass);

    assert_eq!(rec.defects().len(), 1);
    assert_eq!(rec.defects()[0].severity, Severity::High);
    assert_eq!(rec.defects()[0].category, "ELEMENT_NOT_FOUND");
    assert!(page.navigations().is_empty());
}

#[tokio::test]
async fn test_skip_runs_no_steps() {
    let page = FakePage::new();
    let spec = scenario(
        r#"
name: calendar-sync
skip: true
steps:
  - action: navigate
    route: /calendar
"#,
    );

    let shots = tempfile::tempdir().unwrap();
    let config = fast_config();
    let mut rec = recorder(shots.path());
    let status = ScenarioRunner::new(&config, "x")
        .run_scenario(&page, &mut rec, &spec)
        .await
        .unwrap();

    assert_eq!(status, TestStatus::Skip);
    assert_eq!(rec.outcomes()[0].status, TestStatus::Skip);
    assert!(page.navigations().is_empty());
}

#[tokio::test]
async fn test_login_without_shell_is_critical() {
    let page = FakePage::new();
    page.add(
        &Strategy::xpath("//button[contains(normalize-space(.), 'Sign in with Google')]"),
        Node::button("Sign in with Google"),
    );
    page.add(&Strategy::css(".navbar"), Node::default());
    page.push_console("error", "auth/invalid-custom-token");
    page.push_console("info", "boot");

    let shots = tempfile::tempdir().unwrap();
    let config = fast_config();
    let mut rec = recorder(shots.path());
    let status = ScenarioRunner::new(&config, "x")
        .run_scenario(&page, &mut rec, &scenario("name: auth\nsteps:\n  - action: login\n"))
        .await
        .unwrap();

    assert_eq!(status, TestStatus::Fail);
    let defect = &rec.defects()[0];
    assert_eq!(defect.severity, Severity::Critical);
    assert_eq!(defect.category, "AUTHENTICATION");
    assert_eq!(defect.console_logs, vec!["[ERROR] auth/invalid-custom-token".to_string()]);
    assert!(defect.url.contains("test-login=ai-agent-token"));
}

#[tokio::test]
async fn test_unknown_persona_fails_login() {
    let page = signed_in_page();
    let spec = scenario("name: auth\npersona: nobody\nsteps:\n  - action: login\n");

    let shots = tempfile::tempdir().unwrap();
    let config = fast_config();
    let mut rec = recorder(shots.path());
    let status = ScenarioRunner::new(&config, "x")
        .run_scenario(&page, &mut rec, &spec)
        .await
        .unwrap();

    assert_eq!(status, TestStatus::Fail);
    assert!(rec.defects()[0].message.contains("nobody"));
    assert!(page.navigations().is_empty());
}

#[tokio::test]
async fn test_required_fill_fails_without_extra_defect() {
    let page = FakePage::new();
    let spec = scenario(
        r#"
name: tasks-create
steps:
  - action: fill
    required: true
    fields:
      - name: title
        value: Demo Task
        strategies: ["testid:task-title"]
"#,
    );

    let shots = tempfile::tempdir().unwrap();
    let config = fast_config();
    let mut rec = recorder(shots.path());
    let status = ScenarioRunner::new(&config, "x")
        .run_scenario(&page, &mut rec, &spec)
        .await
        .unwrap();

    assert_eq!(status, TestStatus::Fail);
    assert_eq!(rec.defects().len(), 1);
    assert_eq!(rec.defects()[0].category, "FIELD_NOT_FOUND");
    assert!(rec.outcomes()[0].message.contains("required fields not filled: title"));
}

#[tokio::test]
async fn test_screenshot_failure_does_not_fail_step() {
    let page = FakePage::new();
    page.fail_screenshots();
    let spec = scenario("name: shots\nsteps:\n  - action: screenshot\n    name: goals\n");

    let shots = tempfile::tempdir().unwrap();
    let config = fast_config();
    let mut rec = recorder(shots.path());
    let status = ScenarioRunner::new(&config, "x")
        .run_scenario(&page, &mut rec, &spec)
        .await
        .unwrap();
    assert_eq!(status, TestStatus::Pass);
}

#[tokio::test]
async fn test_transport_failure_aborts_remaining_scenarios() {
    let page = FakePage::new();
    page.break_transport_on(&Strategy::test_id("add-sprint"));
    let specs = vec![
        scenario("name: sprints-add\nsteps:\n  - action: click\n    target: Add Sprint\n"),
        scenario("name: sprints-list\nsteps:\n  - action: log\n    message: hi\n"),
    ];

    let shots = tempfile::tempdir().unwrap();
    let config = fast_config();
    let mut rec = recorder(shots.path());
    let result = ScenarioRunner::new(&config, "x")
        .run_all(&page, &mut rec, &specs)
        .await;

    assert!(matches!(result, Err(ref e) if e.is_fatal()));
    assert!(matches!(result, Err(E2eError::Driver(_))));
    assert_eq!(rec.outcomes().len(), 1);
    assert_eq!(rec.outcomes()[0].status, TestStatus::Fail);
}

#[test]
fn test_bundled_scenarios_parse() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios");
    let specs = ScenarioSpec::load_all(&dir).unwrap();
    let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    for expected in ["auth-side-door", "goals-crud", "stories-crud", "tasks-crud", "sprints-view", "calendar-sync"] {
        assert!(names.contains(&expected), "missing bundled scenario {expected}");
    }
}
