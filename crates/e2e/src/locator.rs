//! Resilient element location
//!
//! A logical target ("the Add Goal button") is described by a [`Cascade`]
//! of strategies tried in caller order. Each strategy is polled until it
//! matches or its timeout runs out, then the next one gets its turn.
//!
//! ```text
//! css:[data-testid="add-goal"]      -> Css
//! xpath://button[@type='submit']    -> XPath
//! text:Add Goal                     -> XPath over normalized text
//! name:title                        -> Css [name="title"]
//! testid:goal-title                 -> Css [data-testid="goal-title"]
//! form button[type=submit]          -> Css (no prefix)
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use bobqa_common::config::TimingConfig;

use crate::driver::{Page, Query};
use crate::error::{DriverResult, E2eError};

/// One way of finding an element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Strategy {
    Css(String),
    XPath(String),
    /// Deepest element whose normalized text contains the value
    Text(String),
    /// Form control `name` attribute
    Name(String),
    /// `data-testid` attribute
    TestId(String),
}

impl Strategy {
    pub fn css(q: impl Into<String>) -> Self {
        Strategy::Css(q.into())
    }

    pub fn xpath(q: impl Into<String>) -> Self {
        Strategy::XPath(q.into())
    }

    pub fn text(t: impl Into<String>) -> Self {
        Strategy::Text(t.into())
    }

    pub fn name(n: impl Into<String>) -> Self {
        Strategy::Name(n.into())
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Strategy::TestId(id.into())
    }

    /// Concrete query for a backend
    pub fn query(&self) -> Query {
        match self {
            Strategy::Css(q) => Query::Css(q.clone()),
            Strategy::XPath(q) => Query::XPath(q.clone()),
            Strategy::Text(t) => {
                let lit = xpath_literal(t);
                Query::XPath(format!(
                    "//*[contains(normalize-space(.), {lit})][not(*[contains(normalize-space(.), {lit})])]"
                ))
            }
            Strategy::Name(n) => Query::Css(format!("[name=\"{}\"]", css_escape(n))),
            Strategy::TestId(id) => Query::Css(format!("[data-testid=\"{}\"]", css_escape(id))),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Css(q) => write!(f, "css:{q}"),
            Strategy::XPath(q) => write!(f, "xpath:{q}"),
            Strategy::Text(t) => write!(f, "text:{t}"),
            Strategy::Name(n) => write!(f, "name:{n}"),
            Strategy::TestId(id) => write!(f, "testid:{id}"),
        }
    }
}

impl FromStr for Strategy {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let strategy = if let Some(q) = s.strip_prefix("css:") {
            Strategy::Css(q.trim().to_string())
        } else if let Some(q) = s.strip_prefix("xpath:") {
            Strategy::XPath(q.trim().to_string())
        } else if let Some(t) = s.strip_prefix("text:") {
            Strategy::Text(t.trim().to_string())
        } else if let Some(n) = s.strip_prefix("name:") {
            Strategy::Name(n.trim().to_string())
        } else if let Some(id) = s.strip_prefix("testid:") {
            Strategy::TestId(id.trim().to_string())
        } else {
            Strategy::Css(s.to_string())
        };

        let empty = match &strategy {
            Strategy::Css(v)
            | Strategy::XPath(v)
            | Strategy::Text(v)
            | Strategy::Name(v)
            | Strategy::TestId(v) => v.is_empty(),
        };
        if empty {
            return Err(E2eError::InvalidStrategy(format!("empty query in '{s}'")));
        }
        Ok(strategy)
    }
}

impl TryFrom<String> for Strategy {
    type Error = E2eError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Strategy> for String {
    fn from(s: Strategy) -> Self {
        s.to_string()
    }
}

/// Quote a string as an XPath 1.0 literal
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        return format!("'{s}'");
    }
    if !s.contains('"') {
        return format!("\"{s}\"");
    }
    let parts: Vec<String> = s
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

fn css_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn slug(label: &str) -> String {
    label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Non-empty ordered list of strategies for one logical target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Strategy>", into = "Vec<Strategy>")]
pub struct Cascade(Vec<Strategy>);

impl Cascade {
    pub fn new(strategies: Vec<Strategy>) -> Result<Self, E2eError> {
        if strategies.is_empty() {
            return Err(E2eError::EmptyCascade);
        }
        Ok(Self(strategies))
    }

    pub fn single(strategy: Strategy) -> Self {
        Self(vec![strategy])
    }

    /// Usual markup variants for a form control
    pub fn for_field(name: &str) -> Self {
        let label = xpath_literal(name);
        Self(vec![
            Strategy::name(name),
            Strategy::css(format!("[id=\"{}\"]", css_escape(name))),
            Strategy::test_id(name),
            Strategy::test_id(format!("{name}-input")),
            Strategy::css(format!("[placeholder*=\"{}\" i]", css_escape(name))),
            Strategy::xpath(format!(
                "//label[contains(translate(normalize-space(.), 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), {})]/following::*[self::input or self::textarea or self::select][1]",
                xpath_literal(&name.to_lowercase())
            )),
            Strategy::xpath(format!("//*[@aria-label={label}]")),
        ])
    }

    /// Usual markup variants for a button
    pub fn for_button(label: &str) -> Self {
        let lit = xpath_literal(label);
        Self(vec![
            Strategy::test_id(slug(label)),
            Strategy::css(format!("[aria-label=\"{}\"]", css_escape(label))),
            Strategy::xpath(format!("//button[contains(normalize-space(.), {lit})]")),
            Strategy::text(label),
        ])
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl TryFrom<Vec<Strategy>> for Cascade {
    type Error = E2eError;

    fn try_from(strategies: Vec<Strategy>) -> Result<Self, Self::Error> {
        Self::new(strategies)
    }
}

impl From<Cascade> for Vec<Strategy> {
    fn from(c: Cascade) -> Self {
        c.0
    }
}

/// Result of a locate call
#[derive(Debug, Clone)]
pub enum Location<E> {
    Found {
        element: E,
        /// Index of the winning strategy in the cascade
        index: usize,
        strategy: Strategy,
    },
    NotFound {
        attempted: Vec<Strategy>,
    },
}

impl<E> Location<E> {
    pub fn is_found(&self) -> bool {
        matches!(self, Location::Found { .. })
    }

    pub fn element(self) -> Option<E> {
        match self {
            Location::Found { element, .. } => Some(element),
            Location::NotFound { .. } => None,
        }
    }
}

/// Polls strategies for a matching element
#[derive(Debug, Clone, Copy)]
pub struct Locator {
    timeout: Duration,
    poll_interval: Duration,
}

impl Locator {
    /// `timeout` applies to each strategy separately
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self::new(timing.locate_timeout(), timing.poll_interval())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// First element of the first strategy that matches.
    ///
    /// Not-found is an ordinary result. Only transport failures are errors.
    pub async fn locate<P>(&self, page: &P, cascade: &Cascade) -> DriverResult<Location<P::Element>>
    where
        P: Page + ?Sized,
    {
        for (index, strategy) in cascade.strategies().iter().enumerate() {
            let query = strategy.query();
            let deadline = Instant::now() + self.timeout;

            loop {
                match page.find_all(&query).await {
                    Ok(mut elements) if !elements.is_empty() => {
                        debug!("Located {} with strategy #{} ({})", query, index, strategy);
                        return Ok(Location::Found {
                            element: elements.swap_remove(0),
                            index,
                            strategy: strategy.clone(),
                        });
                    }
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        debug!("Strategy {} rejected: {}", strategy, e);
                        break;
                    }
                }

                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
            }
            debug!("Strategy {} found nothing", strategy);
        }

        Ok(Location::NotFound {
            attempted: cascade.strategies().to_vec(),
        })
    }
}

/// Poll `probe` until it returns true or `timeout` passes.
///
/// Interaction errors count as "not yet"; transport errors propagate.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> DriverResult<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DriverResult<bool>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match probe().await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Condition probe failed: {}", e),
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
