//! Replan probe commands

use anyhow::{Context, Result};
use bobqa_common::replan::{CalendarBlock, WorkItem};
use bobqa_common::QaConfig;
use bobqa_probe::functions::check_days;
use bobqa_probe::{
    analyze, Analysis, BlockWindow, CallableClient, FirestoreStore, LiveReport, ReplanProbe, SnapshotStore,
};
use chrono::{TimeZone, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::load_config;
use crate::output::{new_table, print_heading, print_info, print_json, print_warning, spinner, OutputFormat};

#[derive(Subcommand)]
pub enum ReplanCommands {
    /// Recompute the focus set and the block changes it implies; read-only
    Analyze(AnalyzeArgs),

    /// Trigger the remote replan and report what changed
    Live(LiveArgs),
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Owner uid (defaults to backend.owner_uid)
    #[arg(long)]
    pub owner: Option<String>,

    /// Read records from a JSON snapshot instead of Firestore
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Calendar window in days (defaults to backend.window_days)
    #[arg(long)]
    pub days: Option<u32>,
}

#[derive(Args)]
pub struct LiveArgs {
    /// Owner uid (defaults to backend.owner_uid)
    #[arg(long)]
    pub owner: Option<String>,

    /// Days passed to the replan function (defaults to backend.window_days)
    #[arg(long)]
    pub days: Option<u32>,
}

pub async fn execute(cmd: ReplanCommands, config_path: &Path, format: OutputFormat) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    match cmd {
        ReplanCommands::Analyze(args) => execute_analyze(args, &config, format).await,
        ReplanCommands::Live(args) => execute_live(args, &config, format).await,
    }
}

fn owner(arg: Option<String>, config: &QaConfig) -> Result<String> {
    match arg {
        Some(owner) => Ok(owner),
        None => config.backend.owner_uid.resolve().context("owner uid"),
    }
}

async fn execute_analyze(args: AnalyzeArgs, config: &QaConfig, format: OutputFormat) -> Result<ExitCode> {
    let days = check_days(args.days.unwrap_or(config.backend.window_days))?;
    let window = BlockWindow::from_now(days);

    let analysis = match &args.snapshot {
        Some(path) => {
            let store = SnapshotStore::from_file(path)?;
            let owner = args.owner.unwrap_or_default();
            analyze(&store, &owner, window).await?
        }
        None => {
            let store = FirestoreStore::from_config(&config.backend)?;
            let owner = owner(args.owner, config)?;
            analyze(&store, &owner, window).await?
        }
    };

    match format {
        OutputFormat::Json => print_json(&analysis),
        OutputFormat::Table => print_analysis(&analysis),
    }
    Ok(ExitCode::SUCCESS)
}

async fn execute_live(args: LiveArgs, config: &QaConfig, format: OutputFormat) -> Result<ExitCode> {
    let days = check_days(args.days.unwrap_or(config.backend.window_days))?;
    let owner = owner(args.owner, config)?;
    let store = FirestoreStore::from_config(&config.backend)?;
    let trigger = CallableClient::from_config(&config.backend)?;

    let bar = spinner(&format!("Replanning via {}", trigger.url()), format);
    let result = ReplanProbe::new(&store, &trigger, &config.timing)
        .live(&owner, days)
        .await;
    bar.finish_and_clear();
    let report = result?;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => print_live(&report),
    }
    Ok(ExitCode::SUCCESS)
}

fn start_cell(block: &CalendarBlock) -> String {
    block
        .start_ms
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

fn link_cell(block: &CalendarBlock) -> String {
    block.link().map(|k| k.to_string()).unwrap_or_default()
}

fn print_items(title: &str, items: &[WorkItem]) {
    print_heading(title);
    if items.is_empty() {
        println!("  none");
        return;
    }
    let mut table = new_table(vec!["#", "Kind", "Id", "Title", "Priority", "AI Score", "Final"]);
    for (i, item) in items.iter().enumerate() {
        let final_score = if item.is_critical() {
            item.final_score().to_string().bold().to_string()
        } else {
            item.final_score().to_string()
        };
        table.add_row(vec![
            (i + 1).to_string(),
            item.kind.as_str().to_string(),
            item.id.clone(),
            item.title.clone(),
            item.priority.to_string(),
            item.ai_score.to_string(),
            final_score,
        ]);
    }
    println!("{table}");
}

fn print_blocks(title: &str, blocks: &[CalendarBlock]) {
    print_heading(title);
    if blocks.is_empty() {
        println!("  none");
        return;
    }
    let mut table = new_table(vec!["Id", "Title", "Type", "Link", "Start", "AI", "GCal"]);
    for block in blocks {
        table.add_row(vec![
            block.id.clone(),
            block.display_title().to_string(),
            block.entity_type.clone().unwrap_or_else(|| "N/A".to_string()),
            link_cell(block),
            start_cell(block),
            if block.is_ai() { "yes" } else { "" }.to_string(),
            if block.google_event_id.is_some() { "yes" } else { "" }.to_string(),
        ]);
    }
    println!("{table}");
}

fn print_analysis(analysis: &Analysis) {
    let counts = &analysis.counts;
    print_info(&format!(
        "{} sprints ({} active), {} stories, {} tasks, {} blocks ({} AI)",
        counts.sprints, counts.active_sprints, counts.stories, counts.tasks, counts.blocks, counts.ai_blocks
    ));

    print_items("Focus stories", &analysis.focus.stories);
    print_items("Focus tasks", &analysis.focus.tasks);

    print_blocks(&format!("{}", "Stale AI blocks (remove)".red()), &analysis.plan.remove);
    print_blocks(&format!("{}", "AI blocks (keep)".green()), &analysis.plan.keep);
    print_items("Focus items without a block (create)", &analysis.plan.create);

    if !analysis.overlaps.is_empty() {
        println!();
        print_warning("Non-critical items scored at or above the critical bonus:");
        print_items("Bonus overlaps", &analysis.overlaps);
    }
}

fn print_live(report: &LiveReport) {
    print_analysis(&report.expected);

    print_heading("Function response");
    let response = &report.response;
    let show = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
    let mut table = new_table(vec!["ok", "created", "removed", "rescheduled", "blocked"]);
    table.add_row(vec![
        response.ok.map(|b| b.to_string()).unwrap_or_else(|| "-".to_string()),
        show(response.created),
        show(response.removed),
        show(response.rescheduled),
        show(response.blocked),
    ]);
    println!("{table}");

    let delta = &report.delta;
    print_blocks("Removed blocks", &delta.removed);
    print_blocks("Added blocks", &delta.added);
    println!();
    println!(
        "  {} removed ({} AI), {} added, {} unchanged",
        delta.removed.len(),
        delta.ai_removed(),
        delta.added.len(),
        delta.unchanged
    );

    if report.settled {
        print_info(&format!("Block set changed after {}ms", report.waited_ms));
    } else {
        print_warning(&format!("Block set unchanged after {}ms", report.waited_ms));
    }
}
