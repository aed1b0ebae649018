//! Replan probe against in-memory stores

use async_trait::async_trait;
use bobqa_common::config::TimingConfig;
use bobqa_common::replan::{CalendarBlock, ItemKind, Sprint, WorkItem};
use bobqa_probe::{
    analyze, BlockWindow, ProbeError, ProbeResult, ReplanProbe, ReplanResponse, ReplanTrigger, Snapshot,
    SnapshotStore, WorkStore,
};
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn snapshot() -> Snapshot {
    let now = Utc::now().timestamp_millis();
    serde_json::from_value(json!({
        "sprints": [
            { "id": "sp-active", "status": "active" },
            { "id": "sp-closed", "status": "closed" }
        ],
        "stories": [
            { "id": "item1", "title": "one", "priority": 5, "aiCriticalityScore": 100, "status": 0 },
            { "id": "item2", "title": "two", "priority": 2, "aiCriticalityScore": 400, "status": 0 },
            { "id": "item3", "title": "three", "priority": 1, "aiCriticalityScore": 50, "status": 0 },
            { "id": "item4", "title": "four", "priority": 4, "aiCriticalityScore": 10, "status": 0 },
            { "id": "item5", "title": "five", "priority": 0, "aiCriticalityScore": 999, "status": 0 },
            { "id": "closed-sprint", "priority": 5, "aiCriticalityScore": 900, "status": 0, "sprintId": "sp-closed" }
        ],
        "tasks": [
            { "id": "t1", "priority": "4", "aiCriticalityScore": "20", "status": 0, "sprintId": "sp-active" },
            { "id": "t-done", "priority": 5, "aiCriticalityScore": 80, "status": "done" }
        ],
        "calendar_blocks": [
            { "id": "b-stale", "aiGenerated": true, "storyId": "item2", "start": now + 60_000 },
            { "id": "b-keep", "createdBy": "ai", "storyId": "item1", "start": now + 120_000 },
            { "id": "b-manual", "taskId": "t1", "start": now + 180_000 }
        ]
    }))
    .unwrap()
}

fn timing() -> TimingConfig {
    TimingConfig {
        poll_interval_ms: 5,
        settle_timeout_ms: 60,
        ..TimingConfig::default()
    }
}

fn ids(items: &[WorkItem]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

#[tokio::test]
async fn test_analysis_focus_and_plan() {
    let store = SnapshotStore::new(snapshot());
    let analysis = analyze(&store, "owner", BlockWindow::from_now(7)).await.unwrap();

    assert_eq!(ids(&analysis.focus.stories), vec!["item5", "item1", "item4"]);
    assert_eq!(ids(&analysis.focus.tasks), vec!["t1"]);
    assert_eq!(analysis.counts.active_sprints, 1);
    assert_eq!(analysis.counts.ai_blocks, 2);

    let removed: Vec<&str> = analysis.plan.remove.iter().map(|b| b.id.as_str()).collect();
    let kept: Vec<&str> = analysis.plan.keep.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(removed, vec!["b-stale"]);
    assert_eq!(kept, vec!["b-keep"]);
    // item1 and t1 already have blocks
    assert_eq!(ids(&analysis.plan.create), vec!["item5", "item4"]);

    assert_eq!(ids(&analysis.overlaps), vec!["item5"]);
}

/// Store whose blocks can be swapped by the fake trigger
struct SharedStore {
    inner: SnapshotStore,
    blocks: Mutex<Vec<CalendarBlock>>,
}

impl SharedStore {
    fn new(snapshot: Snapshot) -> Self {
        let blocks = snapshot.calendar_blocks.clone();
        Self {
            inner: SnapshotStore::new(snapshot),
            blocks: Mutex::new(blocks),
        }
    }
}

#[async_trait]
impl WorkStore for SharedStore {
    async fn sprints(&self, owner: &str) -> ProbeResult<Vec<Sprint>> {
        self.inner.sprints(owner).await
    }

    async fn stories(&self, owner: &str) -> ProbeResult<Vec<WorkItem>> {
        self.inner.stories(owner).await
    }

    async fn tasks(&self, owner: &str) -> ProbeResult<Vec<WorkItem>> {
        self.inner.tasks(owner).await
    }

    async fn calendar_blocks(&self, _owner: &str, _window: BlockWindow) -> ProbeResult<Vec<CalendarBlock>> {
        Ok(self.blocks.lock().unwrap().clone())
    }
}

struct FakeTrigger<'a> {
    store: &'a SharedStore,
    replace_with: Option<Vec<CalendarBlock>>,
    calls: AtomicUsize,
}

#[async_trait]
impl ReplanTrigger for FakeTrigger<'_> {
    async fn replan(&self, _days: u32) -> ProbeResult<ReplanResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(blocks) = &self.replace_with {
            *self.store.blocks.lock().unwrap() = blocks.clone();
        }
        Ok(serde_json::from_value(json!({ "ok": true, "created": 2, "removed": 1 })).unwrap())
    }
}

fn block(id: &str, story: &str) -> CalendarBlock {
    serde_json::from_value(json!({ "id": id, "aiGenerated": true, "storyId": story })).unwrap()
}

#[tokio::test]
async fn test_live_reports_observed_delta() {
    let snap = snapshot();
    let mut after: Vec<CalendarBlock> = snap
        .calendar_blocks
        .iter()
        .filter(|b| b.id != "b-stale")
        .cloned()
        .collect();
    after.push(block("b-new5", "item5"));
    after.push(block("b-new4", "item4"));

    let store = SharedStore::new(snap);
    let trigger = FakeTrigger {
        store: &store,
        replace_with: Some(after),
        calls: AtomicUsize::new(0),
    };
    let report = ReplanProbe::new(&store, &trigger, &timing()).live("owner", 7).await.unwrap();

    assert!(report.settled);
    assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.delta.removed.len(), 1);
    assert_eq!(report.delta.ai_removed(), 1);
    assert_eq!(report.delta.added.len(), 2);
    assert_eq!(report.delta.unchanged, 2);
    assert_eq!(report.response.created, Some(2));
    assert_eq!(report.expected.plan.create.len(), 2);
}

#[tokio::test]
async fn test_live_unchanged_blocks_reported_unsettled() {
    let store = SharedStore::new(snapshot());
    let trigger = FakeTrigger {
        store: &store,
        replace_with: None,
        calls: AtomicUsize::new(0),
    };
    let report = ReplanProbe::new(&store, &trigger, &timing()).live("owner", 7).await.unwrap();

    assert!(!report.settled);
    assert!(report.delta.is_empty());
    assert!(report.waited_ms >= 60);
}

#[tokio::test]
async fn test_live_rejects_days_before_triggering() {
    let store = SharedStore::new(snapshot());
    let trigger = FakeTrigger {
        store: &store,
        replace_with: None,
        calls: AtomicUsize::new(0),
    };
    let result = ReplanProbe::new(&store, &trigger, &timing()).live("owner", 30).await;

    assert!(matches!(result, Err(ProbeError::InvalidDays(30))));
    assert_eq!(trigger.calls.load(Ordering::SeqCst), 0);
}

struct FailingStore;

#[async_trait]
impl WorkStore for FailingStore {
    async fn sprints(&self, _owner: &str) -> ProbeResult<Vec<Sprint>> {
        Ok(Vec::new())
    }

    async fn stories(&self, _owner: &str) -> ProbeResult<Vec<WorkItem>> {
        Err(ProbeError::Query {
            collection: "stories".to_string(),
            reason: "permission denied".to_string(),
        })
    }

    async fn tasks(&self, _owner: &str) -> ProbeResult<Vec<WorkItem>> {
        Ok(vec![WorkItem::from_record(
            ItemKind::Task,
            serde_json::from_value(json!({ "id": "t" })).unwrap(),
        )])
    }

    async fn calendar_blocks(&self, _owner: &str, _window: BlockWindow) -> ProbeResult<Vec<CalendarBlock>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_query_failure_aborts_analysis() {
    let result = analyze(&FailingStore, "owner", BlockWindow::from_now(7)).await;
    match result {
        Err(ProbeError::Query { collection, .. }) => assert_eq!(collection, "stories"),
        other => panic!("expected query error, got {other:?}"),
    }
}
