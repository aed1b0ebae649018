//! In-memory page for driving scenarios without a browser

#![allow(dead_code)]

use async_trait::async_trait;
use bobqa_common::config::QaConfig;
use bobqa_e2e::{ConsoleEntry, DriverError, DriverResult, Page, Query, Strategy};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Handle into `FakePage`'s element table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeElement(pub usize);

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub tag: String,
    pub text: String,
    pub value: String,
    /// (label, value)
    pub options: Vec<(String, String)>,
    pub rejects_input: bool,
    pub clicks: usize,
}

impl Node {
    pub fn input() -> Self {
        Self { tag: "input".into(), ..Self::default() }
    }

    pub fn button(text: &str) -> Self {
        Self { tag: "button".into(), text: text.into(), ..Self::default() }
    }

    pub fn select(options: &[(&str, &str)]) -> Self {
        Self {
            tag: "select".into(),
            options: options.iter().map(|(l, v)| (l.to_string(), v.to_string())).collect(),
            ..Self::default()
        }
    }

    pub fn rejecting() -> Self {
        Self { tag: "input".into(), rejects_input: true, ..Self::default() }
    }
}

#[derive(Default)]
struct State {
    url: String,
    nodes: Vec<Node>,
    /// query -> (element, polls before it appears)
    registry: HashMap<Query, Vec<(usize, usize)>>,
    polls: HashMap<Query, usize>,
    invalid: HashSet<Query>,
    broken: HashSet<Query>,
    body: String,
    console: Vec<ConsoleEntry>,
    screenshots_fail: bool,
    console_fails: bool,
    navigations: Vec<String>,
    closed: bool,
}

pub struct FakePage {
    state: Mutex<State>,
    closes: Arc<AtomicUsize>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Register an element matched by `strategy`
    pub fn add(&self, strategy: &Strategy, node: Node) -> FakeElement {
        self.add_after(strategy, 0, node)
    }

    /// Register an element that only matches after `polls` queries
    pub fn add_after(&self, strategy: &Strategy, polls: usize, node: Node) -> FakeElement {
        let mut state = self.state();
        state.nodes.push(node);
        let id = state.nodes.len() - 1;
        state.registry.entry(strategy.query()).or_default().push((id, polls));
        FakeElement(id)
    }

    /// Also match an existing element with another strategy
    pub fn alias(&self, strategy: &Strategy, element: FakeElement) {
        self.state().registry.entry(strategy.query()).or_default().push((element.0, 0));
    }

    /// Queries for `strategy` fail as an invalid selector
    pub fn reject_query(&self, strategy: &Strategy) {
        self.state().invalid.insert(strategy.query());
    }

    /// Queries for `strategy` fail as a dead session
    pub fn break_transport_on(&self, strategy: &Strategy) {
        self.state().broken.insert(strategy.query());
    }

    pub fn set_body(&self, body: &str) {
        self.state().body = body.to_string();
    }

    pub fn push_console(&self, level: &str, message: &str) {
        self.state().console.push(ConsoleEntry {
            level: level.to_string(),
            message: message.to_string(),
            timestamp: None,
        });
    }

    pub fn fail_screenshots(&self) {
        self.state().screenshots_fail = true;
    }

    pub fn fail_console(&self) {
        self.state().console_fails = true;
    }

    pub fn value_of(&self, element: FakeElement) -> String {
        self.state().nodes[element.0].value.clone()
    }

    pub fn clicks_of(&self, element: FakeElement) -> usize {
        self.state().nodes[element.0].clicks
    }

    pub fn polls_of(&self, strategy: &Strategy) -> usize {
        self.state().polls.get(&strategy.query()).copied().unwrap_or(0)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn with_node<T>(
        &self,
        element: &FakeElement,
        f: impl FnOnce(&mut Node) -> DriverResult<T>,
    ) -> DriverResult<T> {
        let mut state = self.state();
        if state.closed {
            return Err(DriverError::Transport("session closed".into()));
        }
        let node = state
            .nodes
            .get_mut(element.0)
            .ok_or_else(|| DriverError::Interaction("stale element reference".into()))?;
        f(node)
    }

    fn ensure_open(state: &State) -> DriverResult<()> {
        if state.closed {
            return Err(DriverError::Transport("session closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Page for FakePage {
    type Element = FakeElement;

    async fn goto(&self, url: &str) -> DriverResult<()> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        state.url = url.to_string();
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let state = self.state();
        Self::ensure_open(&state)?;
        Ok(state.url.clone())
    }

    async fn find_all(&self, query: &Query) -> DriverResult<Vec<FakeElement>> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        if state.broken.contains(query) {
            return Err(DriverError::Transport("connection reset by peer".into()));
        }
        if state.invalid.contains(query) {
            return Err(DriverError::Interaction(format!("invalid selector: {query}")));
        }
        let seen = {
            let polls = state.polls.entry(query.clone()).or_insert(0);
            let seen = *polls;
            *polls += 1;
            seen
        };
        Ok(state
            .registry
            .get(query)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, after)| seen >= *after)
                    .map(|(id, _)| FakeElement(*id))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn click(&self, element: &FakeElement) -> DriverResult<()> {
        self.with_node(element, |node| {
            node.clicks += 1;
            Ok(())
        })
    }

    async fn clear(&self, element: &FakeElement) -> DriverResult<()> {
        self.with_node(element, |node| {
            node.value.clear();
            Ok(())
        })
    }

    async fn send_keys(&self, element: &FakeElement, text: &str) -> DriverResult<()> {
        self.with_node(element, |node| {
            if node.rejects_input {
                return Err(DriverError::Interaction("element not interactable".into()));
            }
            node.value.push_str(text);
            Ok(())
        })
    }

    async fn select_by_label(&self, element: &FakeElement, label: &str) -> DriverResult<()> {
        self.with_node(element, |node| {
            let value = node
                .options
                .iter()
                .find(|(l, _)| l == label)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| DriverError::Interaction(format!("no option labelled {label}")))?;
            node.value = value;
            Ok(())
        })
    }

    async fn select_by_value(&self, element: &FakeElement, value: &str) -> DriverResult<()> {
        self.with_node(element, |node| {
            if !node.options.iter().any(|(_, v)| v == value) {
                return Err(DriverError::Interaction(format!("no option with value {value}")));
            }
            node.value = value.to_string();
            Ok(())
        })
    }

    async fn text(&self, element: &FakeElement) -> DriverResult<String> {
        self.with_node(element, |node| Ok(node.text.clone()))
    }

    async fn body_text(&self) -> DriverResult<String> {
        let state = self.state();
        Self::ensure_open(&state)?;
        Ok(state.body.clone())
    }

    async fn evaluate(&self, script: &str) -> DriverResult<serde_json::Value> {
        let state = self.state();
        Self::ensure_open(&state)?;
        if script.contains("readyState") {
            return Ok(serde_json::Value::Bool(true));
        }
        Ok(serde_json::Value::Null)
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        let state = self.state();
        Self::ensure_open(&state)?;
        if state.screenshots_fail {
            return Err(DriverError::Interaction("screenshot unavailable".into()));
        }
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn console_entries(&self) -> DriverResult<Vec<ConsoleEntry>> {
        let state = self.state();
        Self::ensure_open(&state)?;
        if state.console_fails {
            return Err(DriverError::Interaction("console log unavailable".into()));
        }
        Ok(state.console.clone())
    }

    async fn close(&self) -> DriverResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        if state.closed {
            return Err(DriverError::Transport("session already closed".into()));
        }
        state.closed = true;
        Ok(())
    }
}

/// Defaults with polling bounds short enough for tests
pub fn fast_config() -> QaConfig {
    let mut config = QaConfig::default();
    config.timing.locate_timeout_ms = 30;
    config.timing.poll_interval_ms = 5;
    config.timing.ready_timeout_ms = 60;
    config.timing.settle_timeout_ms = 60;
    config
}
