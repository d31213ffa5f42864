//! Read-only summary of the vault, rendered to `Dashboard.md`.
//!
//! Collecting only reads the vault and rendering is a pure function of the
//! snapshot. The dashboard never moves or edits a work item.

use crate::claim;
use crate::error::Result;
use crate::io;
use crate::layout::{VaultLayout, STAGES};
use crate::plan::Plan;
use crate::runtime::Component;
use crate::watcher::instance::{self, WatcherInstance};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDepth {
    pub stage: String,
    pub queued: usize,
    /// Entries currently claimed by a running component.
    pub claimed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatcherHealth {
    #[serde(flatten)]
    pub record: WatcherInstance,
    /// The record says live but its process is gone.
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingApproval {
    pub plan: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub stages: Vec<StageDepth>,
    pub watchers: Vec<WatcherHealth>,
    pub expired_last_24h: usize,
    pub oldest_pending_approval: Option<PendingApproval>,
}

impl DashboardSnapshot {
    pub fn collect(layout: &VaultLayout, now: DateTime<Utc>) -> Result<Self> {
        let mut stages = Vec::with_capacity(STAGES.len());
        for stage in STAGES {
            let dir = layout.stage(stage);
            stages.push(StageDepth {
                stage: stage.to_string(),
                queued: io::list_queue(&dir)?.len(),
                claimed: claim::list_claimed(&dir)?.len(),
            });
        }

        let watchers = instance::load_all(layout)?
            .into_iter()
            .map(|record| WatcherHealth {
                stale: record.is_stale(),
                record,
            })
            .collect();

        let day_ago = now - Duration::hours(24);
        let expired_dir = layout.expired();
        let expired_last_24h = io::list_queue(&expired_dir)?
            .into_iter()
            .filter(|name| {
                std::fs::metadata(expired_dir.join(name))
                    .and_then(|m| m.modified())
                    .map(|m| DateTime::<Utc>::from(m) >= day_ago)
                    .unwrap_or(false)
            })
            .count();

        let plans_dir = layout.plans();
        let oldest_pending_approval = io::list_queue(&plans_dir)?
            .into_iter()
            .filter_map(|name| Plan::load(&plans_dir.join(&name), &name).ok())
            .map(|plan| PendingApproval {
                generated_at: plan.generated_at(),
                plan: plan.name,
            })
            .min_by(|a, b| {
                a.generated_at
                    .cmp(&b.generated_at)
                    .then_with(|| a.plan.cmp(&b.plan))
            });

        Ok(Self {
            generated_at: now,
            stages,
            watchers,
            expired_last_24h,
            oldest_pending_approval,
        })
    }

    pub fn depth(&self, stage: &str) -> usize {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.queued)
            .unwrap_or(0)
    }
}

fn age(from: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let d = now - from;
    if d.num_days() > 0 {
        format!("{}d {}h", d.num_days(), d.num_hours() % 24)
    } else if d.num_hours() > 0 {
        format!("{}h {}m", d.num_hours(), d.num_minutes() % 60)
    } else {
        format!("{}m", d.num_minutes().max(0))
    }
}

/// Render the snapshot as Markdown.
pub fn render(snapshot: &DashboardSnapshot) -> String {
    let now = snapshot.generated_at;
    let mut out = String::from("# AI Employee Dashboard\n\n");
    out.push_str(&format!("_Updated {}_\n\n", now.format("%Y-%m-%d %H:%M:%S UTC")));

    out.push_str("## Queues\n\n| Stage | Waiting | In progress |\n|---|---:|---:|\n");
    for s in &snapshot.stages {
        out.push_str(&format!("| {} | {} | {} |\n", s.stage, s.queued, s.claimed));
    }

    out.push_str("\n## Attention\n\n");
    let mut attention = 0;
    if let Some(p) = &snapshot.oldest_pending_approval {
        out.push_str(&format!(
            "- Oldest plan awaiting approval: `{}` ({} old)\n",
            p.plan,
            age(p.generated_at, now)
        ));
        attention += 1;
    }
    if snapshot.expired_last_24h > 0 {
        out.push_str(&format!(
            "- {} plan(s) expired in the last 24h\n",
            snapshot.expired_last_24h
        ));
        attention += 1;
    }
    for w in &snapshot.watchers {
        if w.stale {
            out.push_str(&format!(
                "- Watcher `{}` reports {} but its process is gone\n",
                w.record.id, w.record.status
            ));
            attention += 1;
        } else if w.record.consecutive_failures > 0 {
            out.push_str(&format!(
                "- Watcher `{}` has failed {} poll(s) in a row\n",
                w.record.id, w.record.consecutive_failures
            ));
            attention += 1;
        }
    }
    if attention == 0 {
        out.push_str("Nothing needs attention.\n");
    }

    out.push_str("\n## Watchers\n\n");
    if snapshot.watchers.is_empty() {
        out.push_str("No watchers have run yet.\n");
    } else {
        out.push_str("| Watcher | Kind | Status | Last poll | Failures | Restarts | Items |\n");
        out.push_str("|---|---|---|---|---:|---:|---:|\n");
        for w in &snapshot.watchers {
            let r = &w.record;
            let status = if w.stale {
                format!("{} (stale)", r.status)
            } else {
                r.status.to_string()
            };
            let last_poll = r
                .last_poll_at
                .map(|t| format!("{} ago", age(t, now)))
                .unwrap_or_else(|| "never".to_string());
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                r.id,
                r.kind,
                status,
                last_poll,
                r.consecutive_failures,
                r.restart_count,
                r.items_emitted
            ));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// DashboardUpdater
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DashboardUpdater {
    layout: VaultLayout,
}

impl DashboardUpdater {
    pub fn new(layout: VaultLayout) -> Self {
        Self { layout }
    }

    /// Collect, render and atomically write `Dashboard.md`.
    pub fn update(&self) -> Result<PathBuf> {
        self.update_at(Utc::now())
    }

    pub fn update_at(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        let snapshot = DashboardSnapshot::collect(&self.layout, now)?;
        let path = self.layout.dashboard_path();
        io::atomic_write(&path, render(&snapshot).as_bytes())?;
        debug!(path = %path.display(), "dashboard updated");
        Ok(path)
    }

    /// [`update`](Self::update), logging instead of failing.
    pub fn refresh(&self) {
        if let Err(e) = self.update() {
            warn!(error = %e, "dashboard update failed");
        }
    }
}

/// `aide dashboard --watch`: refresh on every tick. Failures never stop the
/// loop.
#[async_trait]
impl Component for DashboardUpdater {
    fn name(&self) -> &str {
        "dashboard"
    }

    async fn tick(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.refresh();
        Ok(())
    }
}
