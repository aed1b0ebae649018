//! Analysis and live replan probes

use bobqa_common::config::TimingConfig;
use bobqa_common::replan::{
    active_sprint_ids, bonus_overlaps, BlockDelta, CalendarBlock, FocusSet, ReplanPlan, WorkItem,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::ProbeResult;
use crate::functions::{check_days, ReplanResponse, ReplanTrigger};
use crate::store::{BlockWindow, WorkStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCounts {
    pub sprints: usize,
    pub active_sprints: usize,
    pub stories: usize,
    pub tasks: usize,
    pub blocks: usize,
    pub ai_blocks: usize,
}

/// Focus set and expected block changes, derived from stored records only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub window: BlockWindow,
    pub counts: AnalysisCounts,
    pub focus: FocusSet,
    pub plan: ReplanPlan,
    /// Non-critical items scored at or above the critical bonus
    pub overlaps: Vec<WorkItem>,
    pub blocks: Vec<CalendarBlock>,
}

/// Observed effect of one remote replan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveReport {
    /// Expectation computed before the trigger
    pub expected: Analysis,
    pub response: ReplanResponse,
    pub delta: BlockDelta,
    /// False when the block set had not changed by the settle bound
    pub settled: bool,
    pub waited_ms: u64,
}

pub struct ReplanProbe<'a, S: ?Sized, T: ?Sized> {
    store: &'a S,
    trigger: &'a T,
    poll_interval: Duration,
    settle_timeout: Duration,
}

impl<'a, S, T> ReplanProbe<'a, S, T>
where
    S: WorkStore + ?Sized,
    T: ReplanTrigger + ?Sized,
{
    pub fn new(store: &'a S, trigger: &'a T, timing: &TimingConfig) -> Self {
        Self {
            store,
            trigger,
            poll_interval: timing.poll_interval(),
            settle_timeout: timing.settle_timeout(),
        }
    }

    /// Snapshot, trigger, then poll until the block id set changes
    pub async fn live(&self, owner: &str, days: u32) -> ProbeResult<LiveReport> {
        let days = check_days(days)?;
        let window = BlockWindow::from_now(days);
        let expected = analyze(self.store, owner, window).await?;
        let before: BTreeSet<String> = expected.blocks.iter().map(|b| b.id.clone()).collect();

        let response = self.trigger.replan(days).await?;
        info!(
            "Replan returned ok={:?} created={:?} removed={:?}",
            response.ok, response.created, response.removed
        );

        let started = Instant::now();
        let (after, settled) = loop {
            let blocks = self.store.calendar_blocks(owner, window).await?;
            let ids: BTreeSet<String> = blocks.iter().map(|b| b.id.clone()).collect();
            if ids != before {
                break (blocks, true);
            }
            if started.elapsed() >= self.settle_timeout {
                warn!(
                    "Block set unchanged after {}ms",
                    self.settle_timeout.as_millis()
                );
                break (blocks, false);
            }
            debug!("Block set unchanged, polling again");
            tokio::time::sleep(self.poll_interval).await;
        };

        let delta = BlockDelta::between(&expected.blocks, &after);
        info!(
            "Observed {} removed ({} AI), {} added, {} unchanged",
            delta.removed.len(),
            delta.ai_removed(),
            delta.added.len(),
            delta.unchanged
        );

        Ok(LiveReport {
            expected,
            response,
            delta,
            settled,
            waited_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Recompute the focus set and the plan it implies. Never writes.
pub async fn analyze<S>(store: &S, owner: &str, window: BlockWindow) -> ProbeResult<Analysis>
where
    S: WorkStore + ?Sized,
{
    let sprints = store.sprints(owner).await?;
    let stories = store.stories(owner).await?;
    let tasks = store.tasks(owner).await?;
    let blocks = store.calendar_blocks(owner, window).await?;

    let active = active_sprint_ids(&sprints);
    let focus = FocusSet::select(&stories, &tasks, &active);
    let plan = ReplanPlan::compute(&blocks, &focus);

    let mut overlaps = bonus_overlaps(&stories, &active);
    overlaps.extend(bonus_overlaps(&tasks, &active));
    for item in &overlaps {
        warn!(
            "{} '{}' is not critical but scores {} (>= critical bonus)",
            item.key(),
            item.title,
            item.ai_score
        );
    }

    let counts = AnalysisCounts {
        sprints: sprints.len(),
        active_sprints: active.len(),
        stories: stories.len(),
        tasks: tasks.len(),
        blocks: blocks.len(),
        ai_blocks: blocks.iter().filter(|b| b.is_ai()).count(),
    };
    info!(
        "Focus: {} stories, {} tasks; plan removes {}, keeps {}, creates {}",
        focus.stories.len(),
        focus.tasks.len(),
        plan.remove.len(),
        plan.keep.len(),
        plan.create.len()
    );

    Ok(Analysis {
        window,
        counts,
        focus,
        plan,
        overlaps,
        blocks,
    })
}
