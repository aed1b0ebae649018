//! Form filling over the resilient locator

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::driver::Page;
use crate::error::{DriverError, DriverResult};
use crate::locator::{Cascade, Location, Locator, Strategy};

/// How a value is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    /// Option picked by visible label, then by value
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
    pub kind: FieldKind,
    pub cascade: Cascade,
}

impl FormField {
    /// Text field located with the usual markup variants for `name`
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            kind: FieldKind::Text,
            cascade: Cascade::for_field(name),
        }
    }

    pub fn select(name: &str, value: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Select,
            ..Self::text(name, value)
        }
    }

    pub fn with_cascade(mut self, cascade: Cascade) -> Self {
        self.cascade = cascade;
        self
    }
}

/// What happened to one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FieldResult {
    Filled { strategy: Strategy },
    NotFound { attempted: Vec<Strategy> },
    /// Located, but the browser refused the value
    Rejected { reason: String },
}

impl FieldResult {
    pub fn is_filled(&self) -> bool {
        matches!(self, FieldResult::Filled { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReport {
    pub name: String,
    pub result: FieldResult,
}

/// Per-field results, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub fields: Vec<FieldReport>,
}

impl FillReport {
    /// name -> filled
    pub fn status_map(&self) -> BTreeMap<String, bool> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.result.is_filled()))
            .collect()
    }

    /// True only when every field was filled
    pub fn is_complete(&self) -> bool {
        self.fields.iter().all(|f| f.result.is_filled())
    }

    pub fn missing(&self) -> impl Iterator<Item = &FieldReport> {
        self.fields
            .iter()
            .filter(|f| matches!(f.result, FieldResult::NotFound { .. }))
    }

    pub fn rejected(&self) -> impl Iterator<Item = &FieldReport> {
        self.fields
            .iter()
            .filter(|f| matches!(f.result, FieldResult::Rejected { .. }))
    }
}

pub struct FormFiller {
    locator: Locator,
}

impl FormFiller {
    pub fn new(locator: Locator) -> Self {
        Self { locator }
    }

    /// Fill every field it can. Always visits all fields; only a transport
    /// failure stops early.
    pub async fn fill<P>(&self, page: &P, fields: &[FormField]) -> DriverResult<FillReport>
    where
        P: Page + ?Sized,
    {
        let mut report = FillReport::default();

        for field in fields {
            let result = match self.locator.locate(page, &field.cascade).await? {
                Location::Found { element, strategy, .. } => {
                    match apply(page, &element, field).await {
                        Ok(()) => {
                            debug!("Filled '{}' via {}", field.name, strategy);
                            FieldResult::Filled { strategy }
                        }
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            warn!("Field '{}' rejected its value: {}", field.name, e);
                            FieldResult::Rejected { reason: e.to_string() }
                        }
                    }
                }
                Location::NotFound { attempted } => {
                    warn!("Field '{}' not found ({} strategies)", field.name, attempted.len());
                    FieldResult::NotFound { attempted }
                }
            };
            report.fields.push(FieldReport {
                name: field.name.clone(),
                result,
            });
        }

        Ok(report)
    }
}

async fn apply<P>(page: &P, element: &P::Element, field: &FormField) -> DriverResult<()>
where
    P: Page + ?Sized,
{
    match field.kind {
        FieldKind::Text => {
            page.clear(element).await?;
            page.send_keys(element, &field.value).await
        }
        FieldKind::Select => match page.select_by_label(element, &field.value).await {
            Err(DriverError::Interaction(e)) => {
                debug!("No option labelled '{}' ({}), trying value", field.value, e);
                page.select_by_value(element, &field.value).await
            }
            other => other,
        },
    }
}
