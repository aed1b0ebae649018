//! bobqa UI probes
//!
//! Drives the web application through a WebDriver session and reports what
//! it finds:
//! - Resilient element location over ordered fallback strategies
//! - Form filling that tolerates missing fields
//! - Outcome and defect recording with screenshots and console lines
//! - JSON and Markdown reports
//! - Declarative YAML scenarios
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  run_guarded(page, body)          closes the page once      │
//! │    └── ScenarioRunner::run_all(page, recorder, specs)       │
//! │          ├── Locator::locate(page, cascade) -> Location     │
//! │          ├── FormFiller::fill(page, fields) -> FillReport   │
//! │          └── Recorder::record_outcome / record_defect       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Recorder::finish() -> TestRun                              │
//! │    └── ReportEmitter::emit(run) -> { .json, .md }           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Page (trait)                                                │
//! │    └── WebDriverPage (fantoccini)                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod driver;
pub mod error;
pub mod form;
pub mod locator;
pub mod recorder;
pub mod report;
pub mod runner;
pub mod session;
pub mod spec;
pub mod webdriver;

pub use driver::{ConsoleEntry, Page, Query};
pub use error::{DriverError, DriverResult, E2eError, E2eResult};
pub use form::{FieldKind, FieldResult, FillReport, FormField, FormFiller};
pub use locator::{Cascade, Location, Locator, Strategy};
pub use recorder::Recorder;
pub use report::{ReportEmitter, ReportPaths};
pub use runner::{select_scenarios, ScenarioRunner};
pub use session::run_guarded;
pub use spec::{ScenarioSpec, Step};
pub use webdriver::WebDriverPage;
