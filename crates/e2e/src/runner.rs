//! Scenario runner: executes YAML scenarios against a page

use bobqa_common::config::QaConfig;
use bobqa_common::{Severity, TestStatus};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::driver::{Page, Query};
use crate::error::{DriverError, DriverResult, E2eError, E2eResult};
use crate::form::FormFiller;
use crate::locator::{poll_until, Cascade, Location, Locator, Strategy};
use crate::recorder::Recorder;
use crate::spec::{cascade_or, expand, ScenarioSpec, Step};

const READY_STATE_SCRIPT: &str = "return document.readyState === 'complete';";

/// Present while the app still offers interactive sign-in
const SIGNED_OUT_MARKERS: &[&str] = &["//button[contains(normalize-space(.), 'Sign in with Google')]"];

/// Present only in the signed-in shell
const SIGNED_IN_MARKERS: &[&str] = &[
    ".sidebar",
    ".user-menu",
    ".navbar",
    ".main-content",
    "[data-testid=\"goals\"]",
];

/// Defect to record when a step fails
#[derive(Debug)]
struct DefectSpec {
    severity: Severity,
    category: &'static str,
    details: Value,
}

#[derive(Debug)]
struct StepFailure {
    message: String,
    /// `None` when the step already recorded its own defects
    defect: Option<DefectSpec>,
}

impl StepFailure {
    fn new(severity: Severity, category: &'static str, message: impl Into<String>, details: Value) -> Self {
        Self {
            message: message.into(),
            defect: Some(DefectSpec {
                severity,
                category,
                details,
            }),
        }
    }
}

type StepResult = DriverResult<Option<StepFailure>>;

/// Non-fatal driver errors become a MEDIUM interaction failure
fn interaction(err: DriverError, what: &str) -> StepResult {
    if err.is_fatal() {
        return Err(err);
    }
    Ok(Some(StepFailure::new(
        Severity::Medium,
        "INTERACTION_ERROR",
        format!("{what}: {err}"),
        Value::Null,
    )))
}

fn not_found(severity: Severity, target: &str, attempted: &[Strategy]) -> StepFailure {
    let attempted: Vec<String> = attempted.iter().map(ToString::to_string).collect();
    StepFailure::new(
        severity,
        "ELEMENT_NOT_FOUND",
        format!("'{target}' not found"),
        json!({ "target": target, "attempted": attempted }),
    )
}

/// Pick scenarios by name or tag
pub fn select_scenarios(
    specs: Vec<ScenarioSpec>,
    tag: Option<&str>,
    name: Option<&str>,
) -> E2eResult<Vec<ScenarioSpec>> {
    if let Some(name) = name {
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::ScenarioNotFound(name.to_string()))?;
        return Ok(vec![spec]);
    }
    Ok(match tag {
        Some(tag) => specs.into_iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect(),
        None => specs,
    })
}

/// Executes scenarios; each one yields exactly one outcome
pub struct ScenarioRunner<'a> {
    config: &'a QaConfig,
    locator: Locator,
    /// Substituted for `{run}` in values and expectations
    run_tag: String,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(config: &'a QaConfig, run_tag: impl Into<String>) -> Self {
        Self {
            config,
            locator: Locator::from_timing(&config.timing),
            run_tag: run_tag.into(),
        }
    }

    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = locator;
        self
    }

    /// Run scenarios in order. A failing scenario does not stop the next
    /// one; a transport failure stops the whole run.
    pub async fn run_all<P>(&self, page: &P, recorder: &mut Recorder, specs: &[ScenarioSpec]) -> E2eResult<()>
    where
        P: Page + ?Sized,
    {
        info!("Running {} scenario(s)...", specs.len());
        for spec in specs {
            self.run_scenario(page, recorder, spec).await?;
        }
        Ok(())
    }

    pub async fn run_scenario<P>(
        &self,
        page: &P,
        recorder: &mut Recorder,
        spec: &ScenarioSpec,
    ) -> E2eResult<TestStatus>
    where
        P: Page + ?Sized,
    {
        if spec.skip {
            recorder.record_outcome(&spec.name, TestStatus::Skip, Duration::ZERO, "skipped", None);
            return Ok(TestStatus::Skip);
        }

        debug!("Running scenario: {}", spec.name);
        let start = Instant::now();

        for (i, step) in spec.steps.iter().enumerate() {
            let failure = match self.run_step(page, recorder, spec, step).await {
                Ok(None) => continue,
                Ok(Some(failure)) => failure,
                Err(e) => {
                    let message = format!("step {} ({}): {}", i + 1, step.action(), e);
                    recorder.record_outcome(&spec.name, TestStatus::Fail, start.elapsed(), &message, None);
                    return Err(e.into());
                }
            };

            let message = format!("step {} ({}): {}", i + 1, step.action(), failure.message);
            let screenshot = match failure.defect {
                Some(d) => recorder
                    .record_defect(Some(page), d.severity, d.category, &message, d.details)
                    .await
                    .screenshot_path
                    .clone(),
                None => recorder.capture_screenshot(page, &spec.name).await,
            };
            recorder.record_outcome(&spec.name, TestStatus::Fail, start.elapsed(), &message, screenshot);
            return Ok(TestStatus::Fail);
        }

        let message = format!("{} step(s) passed", spec.steps.len());
        recorder.record_outcome(&spec.name, TestStatus::Pass, start.elapsed(), &message, None);
        Ok(TestStatus::Pass)
    }

    async fn run_step<P>(&self, page: &P, recorder: &mut Recorder, spec: &ScenarioSpec, step: &Step) -> StepResult
    where
        P: Page + ?Sized,
    {
        let timing = &self.config.timing;

        match step {
            Step::Login { persona } => {
                let persona = persona
                    .as_deref()
                    .or(spec.persona.as_deref())
                    .unwrap_or(&self.config.target.default_persona);
                self.login(page, persona).await
            }

            Step::Navigate { route, ready } => {
                let url = self.config.target.route_url(route);
                if let Err(e) = page.goto(&url).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    return Ok(Some(StepFailure::new(
                        Severity::High,
                        "PAGE_NOT_READY",
                        format!("navigation to {route} failed: {e}"),
                        json!({ "route": route }),
                    )));
                }

                match Cascade::new(ready.clone()) {
                    Ok(cascade) => {
                        let locator = self.locator.with_timeout(timing.ready_timeout());
                        match locator.locate(page, &cascade).await? {
                            Location::Found { .. } => Ok(None),
                            Location::NotFound { attempted } => {
                                let attempted: Vec<String> = attempted.iter().map(ToString::to_string).collect();
                                Ok(Some(StepFailure::new(
                                    Severity::High,
                                    "PAGE_NOT_READY",
                                    format!("{route} did not show its ready marker"),
                                    json!({ "route": route, "attempted": attempted }),
                                )))
                            }
                        }
                    }
                    Err(_) => {
                        let loaded = poll_until(timing.ready_timeout(), timing.poll_interval(), move || async move {
                            let state = page.evaluate(READY_STATE_SCRIPT).await?;
                            Ok::<bool, DriverError>(state.as_bool().unwrap_or(false))
                        })
                        .await?;
                        if loaded {
                            Ok(None)
                        } else {
                            Ok(Some(StepFailure::new(
                                Severity::High,
                                "PAGE_NOT_READY",
                                format!("{route} did not finish loading"),
                                json!({ "route": route }),
                            )))
                        }
                    }
                }
            }

            Step::Click {
                target,
                strategies,
                severity,
            } => {
                let cascade = cascade_or(strategies, || Cascade::for_button(target));
                match self.locator.locate(page, &cascade).await? {
                    Location::Found { element, .. } => match page.click(&element).await {
                        Ok(()) => Ok(None),
                        Err(e) => interaction(e, &format!("clicking '{target}'")),
                    },
                    Location::NotFound { attempted } => {
                        Ok(Some(not_found(severity.unwrap_or(Severity::High), target, &attempted)))
                    }
                }
            }

            Step::Fill { fields, required } => {
                let fields: Vec<_> = fields.iter().map(|f| f.to_field(&self.run_tag)).collect();
                let report = FormFiller::new(self.locator).fill(page, &fields).await?;

                for field in report.missing() {
                    recorder
                        .record_defect(
                            Some(page),
                            Severity::Medium,
                            "FIELD_NOT_FOUND",
                            &format!("form field '{}' not found", field.name),
                            json!({ "field": field.name, "result": field.result }),
                        )
                        .await;
                }
                for field in report.rejected() {
                    recorder
                        .record_defect(
                            Some(page),
                            Severity::Medium,
                            "INPUT_ERROR",
                            &format!("form field '{}' rejected its value", field.name),
                            json!({ "field": field.name, "result": field.result }),
                        )
                        .await;
                }

                if *required && !report.is_complete() {
                    let unfilled: Vec<&str> = report
                        .fields
                        .iter()
                        .filter(|f| !f.result.is_filled())
                        .map(|f| f.name.as_str())
                        .collect();
                    return Ok(Some(StepFailure {
                        message: format!("required fields not filled: {}", unfilled.join(", ")),
                        defect: None,
                    }));
                }
                Ok(None)
            }

            Step::ExpectText {
                text,
                timeout_ms,
                severity,
            } => {
                let text = expand(text, &self.run_tag);
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| timing.locate_timeout());
                let expected = text.as_str();
                let seen = poll_until(timeout, timing.poll_interval(), move || async move {
                    let body = page.body_text().await?;
                    Ok::<bool, DriverError>(body.contains(expected))
                })
                .await?;
                if seen {
                    Ok(None)
                } else {
                    Ok(Some(StepFailure::new(
                        severity.unwrap_or(Severity::High),
                        "VERIFICATION_FAILED",
                        format!("text '{text}' did not appear within {}ms", timeout.as_millis()),
                        json!({ "expected_text": text }),
                    )))
                }
            }

            Step::ExpectVisible {
                target,
                strategies,
                severity,
            } => {
                let cascade = cascade_or(strategies, || Cascade::single(Strategy::text(target.as_str())));
                match self.locator.locate(page, &cascade).await? {
                    Location::Found { .. } => Ok(None),
                    Location::NotFound { attempted } => {
                        Ok(Some(not_found(severity.unwrap_or(Severity::High), target, &attempted)))
                    }
                }
            }

            Step::Screenshot { name } => {
                recorder
                    .capture_screenshot(page, &format!("{}_{}", spec.name, name))
                    .await;
                Ok(None)
            }

            Step::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(None)
            }

            Step::Log { message } => {
                info!("[{}] {}", spec.name, expand(message, &self.run_tag));
                Ok(None)
            }
        }
    }

    async fn login<P>(&self, page: &P, persona: &str) -> StepResult
    where
        P: Page + ?Sized,
    {
        let url = match self.config.target.side_door_url(persona) {
            Ok(url) => url,
            Err(e) => {
                return Ok(Some(StepFailure::new(
                    Severity::Critical,
                    "AUTHENTICATION",
                    format!("persona '{persona}' unavailable: {e}"),
                    json!({ "persona": persona }),
                )))
            }
        };

        info!("Side-door login as '{}'", persona);
        if let Err(e) = page.goto(&url).await {
            if e.is_fatal() {
                return Err(e);
            }
            return Ok(Some(StepFailure::new(
                Severity::Critical,
                "AUTHENTICATION",
                format!("side-door navigation failed: {e}"),
                json!({ "persona": persona }),
            )));
        }

        let timing = &self.config.timing;
        let signed_in = poll_until(timing.ready_timeout(), timing.poll_interval(), move || signed_in(page)).await?;
        if signed_in {
            Ok(None)
        } else {
            Ok(Some(StepFailure::new(
                Severity::Critical,
                "AUTHENTICATION",
                format!("side-door login as '{persona}' did not reach the signed-in shell"),
                json!({ "persona": persona, "timeout_ms": timing.ready_timeout_ms }),
            )))
        }
    }
}

/// No sign-in prompt and some part of the signed-in shell present
async fn signed_in<P>(page: &P) -> DriverResult<bool>
where
    P: Page + ?Sized,
{
    for marker in SIGNED_OUT_MARKERS {
        if !page.find_all(&Query::XPath((*marker).to_string())).await?.is_empty() {
            return Ok(false);
        }
    }
    for marker in SIGNED_IN_MARKERS {
        if !page.find_all(&Query::Css((*marker).to_string())).await?.is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}
