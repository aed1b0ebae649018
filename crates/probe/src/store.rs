//! Read access to the records the replan rules work on

use async_trait::async_trait;
use bobqa_common::replan::{CalendarBlock, ItemKind, Sprint, WorkItem, WorkRecord};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ProbeError, ProbeResult};

/// Half-open range of block start times, in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl BlockWindow {
    /// `[at, at + days)`
    pub fn starting_at(at: DateTime<Utc>, days: u32) -> Self {
        let end = at + Duration::days(i64::from(days));
        Self {
            start_ms: at.timestamp_millis(),
            end_ms: end.timestamp_millis(),
        }
    }

    pub fn from_now(days: u32) -> Self {
        Self::starting_at(Utc::now(), days)
    }

    pub fn contains(&self, ms: i64) -> bool {
        ms >= self.start_ms && ms < self.end_ms
    }
}

/// Source of sprint, story, task and calendar block records for one owner
#[async_trait]
pub trait WorkStore: Send + Sync {
    async fn sprints(&self, owner: &str) -> ProbeResult<Vec<Sprint>>;

    /// Stories in stored order
    async fn stories(&self, owner: &str) -> ProbeResult<Vec<WorkItem>>;

    /// Tasks in stored order
    async fn tasks(&self, owner: &str) -> ProbeResult<Vec<WorkItem>>;

    /// Blocks whose start lies inside `window`
    async fn calendar_blocks(&self, owner: &str, window: BlockWindow) -> ProbeResult<Vec<CalendarBlock>>;
}

/// Exported records of a single owner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub sprints: Vec<Sprint>,
    pub stories: Vec<WorkRecord>,
    pub tasks: Vec<WorkRecord>,
    pub calendar_blocks: Vec<CalendarBlock>,
}

/// Offline store backed by a JSON snapshot.
///
/// A snapshot holds one owner's data, so the owner argument is ignored.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    snapshot: Snapshot,
}

impl SnapshotStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_file(path: &Path) -> ProbeResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ProbeError::Snapshot {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let snapshot = serde_json::from_str(&content).map_err(|e| ProbeError::Snapshot {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { snapshot })
    }

    fn items(records: &[WorkRecord], kind: ItemKind) -> Vec<WorkItem> {
        records
            .iter()
            .cloned()
            .map(|r| WorkItem::from_record(kind, r))
            .collect()
    }
}

#[async_trait]
impl WorkStore for SnapshotStore {
    async fn sprints(&self, _owner: &str) -> ProbeResult<Vec<Sprint>> {
        Ok(self.snapshot.sprints.clone())
    }

    async fn stories(&self, _owner: &str) -> ProbeResult<Vec<WorkItem>> {
        Ok(Self::items(&self.snapshot.stories, ItemKind::Story))
    }

    async fn tasks(&self, _owner: &str) -> ProbeResult<Vec<WorkItem>> {
        Ok(Self::items(&self.snapshot.tasks, ItemKind::Task))
    }

    async fn calendar_blocks(&self, _owner: &str, window: BlockWindow) -> ProbeResult<Vec<CalendarBlock>> {
        // Blocks without a start never match a range filter
        Ok(self
            .snapshot
            .calendar_blocks
            .iter()
            .filter(|b| b.start_ms.map(|ms| window.contains(ms)).unwrap_or(false))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_bounds() {
        let at = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        let window = BlockWindow::starting_at(at, 7);
        assert!(window.contains(at.timestamp_millis()));
        assert!(!window.contains(window.end_ms));
        assert_eq!(window.end_ms - window.start_ms, 7 * 24 * 3600 * 1000);
    }

    #[tokio::test]
    async fn test_snapshot_filters_blocks_by_window() {
        let json = r#"{
            "sprints": [{"id": "s1", "status": "active"}],
            "stories": [{"id": "st1", "title": "Story", "priority": "4", "aiCriticalityScore": 12, "status": 0}],
            "calendar_blocks": [
                {"id": "in", "start": 1500, "aiGenerated": true, "storyId": "st1"},
                {"id": "late", "start": 9000},
                {"id": "unscheduled"}
            ]
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, json).unwrap();

        let store = SnapshotStore::from_file(&path).unwrap();
        let window = BlockWindow { start_ms: 1000, end_ms: 5000 };
        let blocks = store.calendar_blocks("ignored", window).await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, "in");

        let stories = store.stories("ignored").await.unwrap();
        assert_eq!(stories[0].priority, 4);
        assert_eq!(stories[0].kind, ItemKind::Story);
        assert!(store.tasks("ignored").await.unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_snapshot_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        match SnapshotStore::from_file(&path) {
            Err(ProbeError::Snapshot { path: p, .. }) => assert!(p.ends_with("broken.json")),
            other => panic!("expected snapshot error, got {other:?}"),
        }
    }
}
