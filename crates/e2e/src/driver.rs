//! Browser page abstraction
//!
//! Everything above this trait talks to a `Page`, never to a concrete
//! WebDriver client, so locator and recorder logic runs unchanged against
//! an in-memory page in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DriverResult;

/// Concrete query understood by every backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    Css(String),
    XPath(String),
}

impl Query {
    pub fn as_str(&self) -> &str {
        match self {
            Query::Css(q) | Query::XPath(q) => q,
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Query::Css(q) => write!(f, "css({q})"),
            Query::XPath(q) => write!(f, "xpath({q})"),
        }
    }
}

/// One captured browser console line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ConsoleEntry {
    /// Warning or error level, under either console or WebDriver log naming
    pub fn is_problem(&self) -> bool {
        matches!(
            self.level.to_ascii_lowercase().as_str(),
            "warn" | "warning" | "error" | "severe"
        )
    }
}

impl std::fmt::Display for ConsoleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level.to_ascii_uppercase(), self.message)
    }
}

/// A live browser page
#[async_trait]
pub trait Page: Send + Sync {
    /// Handle to an element on this page
    type Element: Clone + Send + Sync;

    async fn goto(&self, url: &str) -> DriverResult<()>;

    async fn current_url(&self) -> DriverResult<String>;

    /// All matches in document order
    async fn find_all(&self, query: &Query) -> DriverResult<Vec<Self::Element>>;

    async fn click(&self, element: &Self::Element) -> DriverResult<()>;

    async fn clear(&self, element: &Self::Element) -> DriverResult<()>;

    async fn send_keys(&self, element: &Self::Element, text: &str) -> DriverResult<()>;

    async fn select_by_label(&self, element: &Self::Element, label: &str) -> DriverResult<()>;

    async fn select_by_value(&self, element: &Self::Element, value: &str) -> DriverResult<()>;

    async fn text(&self, element: &Self::Element) -> DriverResult<String>;

    /// Visible text of the whole document
    async fn body_text(&self) -> DriverResult<String>;

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value>;

    /// PNG bytes of the viewport
    async fn screenshot(&self) -> DriverResult<Vec<u8>>;

    /// Console lines captured since the last navigation
    async fn console_entries(&self) -> DriverResult<Vec<ConsoleEntry>>;

    /// Ends the session. Later calls on the page fail with a transport error.
    async fn close(&self) -> DriverResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("SEVERE", true)]
    #[test_case("warning", true)]
    #[test_case("warn", true)]
    #[test_case("error", true)]
    #[test_case("info", false)]
    #[test_case("log", false)]
    fn test_console_problem_levels(level: &str, problem: bool) {
        let entry = ConsoleEntry {
            level: level.to_string(),
            message: "x".to_string(),
            timestamp: None,
        };
        assert_eq!(entry.is_problem(), problem);
    }
}
