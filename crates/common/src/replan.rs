//! Replan rules: priority scoring, in-focus selection and calendar diff
//!
//! These rules re-derive, from raw stored records, which stories and tasks
//! should currently hold AI-generated calendar blocks. They mirror the
//! production recalculation closely enough to validate it from outside.
//!
//! ```text
//! final_score = ai_score + (CRITICAL_BONUS if priority >= CRITICAL_PRIORITY)
//! focus       = top FOCUS_SIZE open items per kind, by final_score desc (stable)
//! remove      = AI blocks linked to an item outside the focus set
//! create      = focus items not linked by any block that survives removal
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Stored priority at or above which an item is critical
pub const CRITICAL_PRIORITY: i64 = 4;

/// Fixed bonus added to critical items
pub const CRITICAL_BONUS: i64 = 500;

/// In-focus items per kind
pub const FOCUS_SIZE: usize = 3;

/// Numeric story status meaning done
const STORY_DONE_STATUS: i64 = 4;

/// Tasks are open only below this numeric status
const TASK_OPEN_STATUS_LIMIT: i64 = 2;

const ACTIVE_SPRINT_STATUSES: [&str; 4] = ["active", "planning", "1", "0"];
const TASK_DONE_STATUSES: [&str; 3] = ["done", "completed", "complete"];

/// Raw stored status; either a label or a numeric code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusValue(pub Value);

impl StatusValue {
    /// Lower-cased text form
    pub fn text(&self) -> String {
        match &self.0 {
            Value::String(s) => s.trim().to_lowercase(),
            Value::Null => String::new(),
            other => other.to_string().to_lowercase(),
        }
    }

    /// Numeric form; labels that are not integers read as 0
    pub fn number(&self) -> i64 {
        lenient_int(&self.0)
    }
}

impl From<&str> for StatusValue {
    fn from(s: &str) -> Self {
        Self(Value::String(s.to_string()))
    }
}

impl From<i64> for StatusValue {
    fn from(n: i64) -> Self {
        Self(Value::from(n))
    }
}

/// Integer view of a stored value. Floats truncate, unparseable reads as 0.
pub fn lenient_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn lenient_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(v) => Some(lenient_int(&v)),
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Work item kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Story,
    Task,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Story => "story",
            ItemKind::Task => "task",
        }
    }
}

/// Key linking a calendar block to a work item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub kind: ItemKind,
    pub id: String,
}

impl ItemKey {
    pub fn story(id: impl Into<String>) -> Self {
        Self { kind: ItemKind::Story, id: id.into() }
    }

    pub fn task(id: impl Into<String>) -> Self {
        Self { kind: ItemKind::Task, id: id.into() }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Sprint document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: StatusValue,
}

impl Sprint {
    pub fn is_active(&self) -> bool {
        ACTIVE_SPRINT_STATUSES.contains(&self.status.text().as_str())
    }
}

/// Story or task document as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub priority: Value,
    #[serde(default)]
    pub ai_criticality_score: Value,
    #[serde(default)]
    pub status: StatusValue,
    #[serde(default)]
    pub sprint_id: Option<String>,
}

/// Story or task, with scores read as integers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub priority: i64,
    pub ai_score: i64,
    pub status: StatusValue,
    pub sprint_id: Option<String>,
}

impl WorkItem {
    pub fn from_record(kind: ItemKind, record: WorkRecord) -> Self {
        let sprint_id = non_empty(&record.sprint_id).map(str::to_string);
        Self {
            id: record.id,
            kind,
            title: record.title.unwrap_or_else(|| "N/A".to_string()),
            priority: lenient_int(&record.priority),
            ai_score: lenient_int(&record.ai_criticality_score),
            status: record.status,
            sprint_id,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey { kind: self.kind, id: self.id.clone() }
    }

    pub fn is_critical(&self) -> bool {
        self.priority >= CRITICAL_PRIORITY
    }

    pub fn final_score(&self) -> i64 {
        final_score(self.priority, self.ai_score)
    }

    /// Whether the item is eligible for focus given the active sprints
    pub fn is_open(&self, active_sprints: &HashSet<String>) -> bool {
        let text = self.status.text();
        let number = self.status.number();
        let status_open = match self.kind {
            ItemKind::Story => text != "done" && number < STORY_DONE_STATUS,
            ItemKind::Task => {
                !TASK_DONE_STATUSES.contains(&text.as_str()) && number < TASK_OPEN_STATUS_LIMIT
            }
        };
        let sprint_ok = match &self.sprint_id {
            None => true,
            Some(id) => active_sprints.contains(id),
        };
        status_open && sprint_ok
    }
}

/// Stored AI score plus the fixed critical bonus
pub fn final_score(priority: i64, ai_score: i64) -> i64 {
    ai_score + if priority >= CRITICAL_PRIORITY { CRITICAL_BONUS } else { 0 }
}

/// Ids of sprints whose status counts as active
pub fn active_sprint_ids(sprints: &[Sprint]) -> HashSet<String> {
    sprints
        .iter()
        .filter(|s| s.is_active())
        .map(|s| s.id.clone())
        .collect()
}

/// Open items sorted by final score, highest first. Ties keep stored order.
pub fn rank_open(items: &[WorkItem], active_sprints: &HashSet<String>) -> Vec<WorkItem> {
    let mut open: Vec<WorkItem> = items
        .iter()
        .filter(|item| item.is_open(active_sprints))
        .cloned()
        .collect();
    open.sort_by_key(|item| std::cmp::Reverse(item.final_score()));
    open
}

/// Open, non-critical items whose ordinary score reaches the bonus.
///
/// Such items can outrank critical ones, so dominance of the bonus no
/// longer holds for them.
pub fn bonus_overlaps(items: &[WorkItem], active_sprints: &HashSet<String>) -> Vec<WorkItem> {
    items
        .iter()
        .filter(|item| item.is_open(active_sprints))
        .filter(|item| !item.is_critical() && item.ai_score >= CRITICAL_BONUS)
        .cloned()
        .collect()
}

/// Stories and tasks currently in focus, in rank order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FocusSet {
    pub stories: Vec<WorkItem>,
    pub tasks: Vec<WorkItem>,
}

impl FocusSet {
    pub fn select(stories: &[WorkItem], tasks: &[WorkItem], active_sprints: &HashSet<String>) -> Self {
        let top = |items: &[WorkItem]| {
            let mut ranked = rank_open(items, active_sprints);
            ranked.truncate(FOCUS_SIZE);
            ranked
        };
        Self {
            stories: top(stories),
            tasks: top(tasks),
        }
    }

    /// Stories first, then tasks
    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
        self.stories.iter().chain(self.tasks.iter())
    }

    pub fn keys(&self) -> HashSet<ItemKey> {
        self.iter().map(WorkItem::key).collect()
    }

    pub fn len(&self) -> usize {
        self.stories.len() + self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Calendar block document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarBlock {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub story_id: Option<String>,
    #[serde(default)]
    pub ai_generated: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default, rename = "start", deserialize_with = "lenient_opt_i64")]
    pub start_ms: Option<i64>,
    #[serde(default, rename = "end", deserialize_with = "lenient_opt_i64")]
    pub end_ms: Option<i64>,
    #[serde(default)]
    pub google_event_id: Option<String>,
}

impl CalendarBlock {
    pub fn is_ai(&self) -> bool {
        self.ai_generated || self.created_by.as_deref() == Some("ai")
    }

    /// Linked item; a story link wins over a task link
    pub fn link(&self) -> Option<ItemKey> {
        non_empty(&self.story_id)
            .map(ItemKey::story)
            .or_else(|| non_empty(&self.task_id).map(ItemKey::task))
    }

    /// Every item this block covers
    pub fn covered(&self) -> Vec<ItemKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(id) = non_empty(&self.task_id) {
            keys.push(ItemKey::task(id));
        }
        if let Some(id) = non_empty(&self.story_id) {
            keys.push(ItemKey::story(id));
        }
        keys
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("N/A")
    }
}

/// Expected effect of a replan on the AI-generated blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplanPlan {
    /// Stale AI blocks
    pub remove: Vec<CalendarBlock>,
    /// AI blocks that stay
    pub keep: Vec<CalendarBlock>,
    /// Focus items with no surviving block
    pub create: Vec<WorkItem>,
}

impl ReplanPlan {
    pub fn compute(blocks: &[CalendarBlock], focus: &FocusSet) -> Self {
        let focus_keys = focus.keys();
        let (remove, keep): (Vec<CalendarBlock>, Vec<CalendarBlock>) = blocks
            .iter()
            .filter(|b| b.is_ai())
            .cloned()
            .partition(|b| matches!(b.link(), Some(key) if !focus_keys.contains(&key)));

        let removed: HashSet<&str> = remove.iter().map(|b| b.id.as_str()).collect();
        let covered: HashSet<ItemKey> = blocks
            .iter()
            .filter(|b| !removed.contains(b.id.as_str()))
            .flat_map(CalendarBlock::covered)
            .collect();

        let create = focus
            .iter()
            .filter(|item| !covered.contains(&item.key()))
            .cloned()
            .collect();

        Self { remove, keep, create }
    }
}

/// Observed change in the block set across a remote replan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockDelta {
    pub removed: Vec<CalendarBlock>,
    pub added: Vec<CalendarBlock>,
    pub unchanged: usize,
}

impl BlockDelta {
    pub fn between(before: &[CalendarBlock], after: &[CalendarBlock]) -> Self {
        let before_ids: HashSet<&str> = before.iter().map(|b| b.id.as_str()).collect();
        let after_ids: HashSet<&str> = after.iter().map(|b| b.id.as_str()).collect();

        Self {
            removed: before
                .iter()
                .filter(|b| !after_ids.contains(b.id.as_str()))
                .cloned()
                .collect(),
            added: after
                .iter()
                .filter(|b| !before_ids.contains(b.id.as_str()))
                .cloned()
                .collect(),
            unchanged: before_ids.intersection(&after_ids).count(),
        }
    }

    pub fn ai_removed(&self) -> usize {
        self.removed.iter().filter(|b| b.is_ai()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}
