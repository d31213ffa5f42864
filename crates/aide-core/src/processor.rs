//! ActionProcessor: drains `Needs_Action` into plans.
//!
//! Each entry is claimed by rename, turned into a plan by the configured
//! generator, and archived into `Done`. A failed attempt puts the entry back
//! and bumps its attempt counter. Once the counter reaches
//! `processor.max_attempts`, the entry is quarantined in `Failed`.
//!
//! The plan is written while the source item is still claimed, so whenever a
//! plan exists its source item has already left the queue.

use crate::audit::AuditLog;
use crate::claim::{self, Claim};
use crate::config::Config;
use crate::dashboard::DashboardUpdater;
use crate::error::{AideError, Result};
use crate::generator::{self, PlanGenerator};
use crate::io;
use crate::item::ActionItem;
use crate::layout::VaultLayout;
use crate::plan::{infer_domain, Plan, PlanHeader};
use crate::runtime::Component;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What one poll did.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub processed: usize,
    pub failed: usize,
    pub quarantined: usize,
    pub recovered: usize,
    /// Entries another process claimed first.
    pub skipped: usize,
}

enum Outcome {
    Processed,
    Failed,
    Quarantined,
    Interrupted,
}

// ---------------------------------------------------------------------------
// Attempt sidecars
// ---------------------------------------------------------------------------

/// Failure counter for one queue entry, kept in
/// `Needs_Action/.attempts/<name>.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempts: u32,
    #[serde(default)]
    pub last_error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    fn path(layout: &VaultLayout, name: &str) -> PathBuf {
        layout.attempts_dir().join(format!("{name}.yaml"))
    }

    /// The entry's record. A sidecar that cannot be read starts the count
    /// over: it belongs to one item and must never stall the queue.
    pub fn load(layout: &VaultLayout, name: &str) -> Self {
        let path = Self::path(layout, name);
        let parsed: Result<Self> = match std::fs::read_to_string(&path) {
            Ok(data) => serde_yaml::from_str(&data).map_err(AideError::from),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => Err(e.into()),
        };
        parsed.unwrap_or_else(|e| {
            warn!(item = name, error = %e, "unreadable attempt record, starting over");
            Self::default()
        })
    }

    fn bump(&mut self, error: &str, now: DateTime<Utc>) {
        self.attempts += 1;
        self.last_error = error.to_string();
        self.last_attempt_at = Some(now);
    }

    fn save(&self, layout: &VaultLayout, name: &str) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&Self::path(layout, name), data.as_bytes())
    }

    fn clear(layout: &VaultLayout, name: &str) {
        let path = Self::path(layout, name);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(item = name, error = %e, "could not remove attempt record");
            }
        }
    }
}

/// Add one failed attempt to `name`'s record. The returned flag is false
/// when the new count could not be persisted.
fn record_attempt(
    layout: &VaultLayout,
    name: &str,
    error: &str,
    now: DateTime<Utc>,
) -> (AttemptRecord, bool) {
    let mut record = AttemptRecord::load(layout, name);
    record.bump(error, now);
    match record.save(layout, name) {
        Ok(()) => (record, true),
        Err(e) => {
            warn!(item = name, error = %e, "could not persist attempt record");
            (record, false)
        }
    }
}

// ---------------------------------------------------------------------------
// ActionProcessor
// ---------------------------------------------------------------------------

pub struct ActionProcessor {
    config: Config,
    layout: VaultLayout,
    generator: Box<dyn PlanGenerator>,
    audit: AuditLog,
    dashboard: DashboardUpdater,
}

impl ActionProcessor {
    pub fn new(config: Config, generator: Box<dyn PlanGenerator>) -> Self {
        let layout = config.layout();
        Self {
            audit: AuditLog::new(layout.clone(), "processor"),
            dashboard: DashboardUpdater::new(layout.clone()),
            layout,
            config,
            generator,
        }
    }

    /// Processor using the generator selected in `config`.
    pub fn from_config(config: Config) -> Self {
        let generator = generator::from_config(&config);
        Self::new(config, generator)
    }

    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<ProcessReport> {
        self.poll_once_at(Utc::now(), cancel).await
    }

    /// One pass over `Needs_Action` as of `now`.
    pub async fn poll_once_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ProcessReport> {
        let queue = self.layout.needs_action();
        let mut report = ProcessReport::default();

        for name in claim::recover_stale(&queue, self.config.claim_grace(), SystemTime::from(now))? {
            report.recovered += 1;
            let (record, _) =
                record_attempt(&self.layout, &name, "claim abandoned by a crashed process", now);
            self.audit.record_at(now, "claim_recovered", &name, format!("attempt {}", record.attempts));
        }

        for name in self.pending_oldest_first(&queue)? {
            if cancel.is_cancelled() {
                break;
            }
            let Some(claim) = Claim::acquire(&queue, &name)? else {
                report.skipped += 1;
                continue;
            };
            let record = AttemptRecord::load(&self.layout, &name);
            if record.attempts >= self.config.processor.max_attempts {
                self.quarantine(claim, record, now)?;
                report.quarantined += 1;
                continue;
            }
            match self.process_claimed(claim, now, cancel).await? {
                Outcome::Processed => report.processed += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Quarantined => report.quarantined += 1,
                Outcome::Interrupted => break,
            }
        }

        Ok(report)
    }

    fn pending_oldest_first(&self, queue: &Path) -> Result<Vec<String>> {
        let mut entries: Vec<(SystemTime, String)> = io::list_queue(queue)?
            .into_iter()
            .map(|name| {
                let mtime = std::fs::metadata(queue.join(&name))
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (mtime, name)
            })
            .collect();
        entries.sort();
        Ok(entries.into_iter().map(|(_, name)| name).collect())
    }

    async fn process_claimed(
        &self,
        claim: Claim,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let item = match ActionItem::load(claim.path(), claim.name()) {
            Ok(item) => item,
            Err(e) => return self.fail(claim, &e, now),
        };

        let generated = tokio::select! {
            result = self.generator.generate(&item) => result,
            _ = cancel.cancelled() => {
                info!(item = %item.name, "shutdown during generation, releasing claim");
                claim.release()?;
                return Ok(Outcome::Interrupted);
            }
        };
        let generated = match generated {
            Ok(g) => g,
            Err(e) => return self.fail(claim, &e, now),
        };

        let auto_approved = self.config.processor.auto_approve.contains(&item.source);
        let domain = infer_domain(&format!(
            "{}\n{}",
            item.subject.as_deref().unwrap_or_default(),
            item.body
        ));
        let plan = Plan {
            name: Plan::file_name(item.stem(), now),
            header: PlanHeader {
                source_item: item.name.clone(),
                source_channel: item.source.clone(),
                domain: domain.to_string(),
                generated_at: Some(now),
                method: Some(generated.method),
                approved_at: auto_approved.then_some(now),
            },
            body: generated.body,
        };
        let dest = if auto_approved {
            self.layout.approved()
        } else {
            self.layout.plans()
        };
        let plan_path = match plan.deposit(&dest) {
            Ok(path) => path,
            Err(e) => return self.fail(claim, &e, now),
        };
        let plan_name = file_name_of(&plan_path);

        let archived = claim.complete_into(&self.layout.done())?;
        io::annotate(
            &archived,
            "Processing log",
            &[
                ("processed_at", now.to_rfc3339()),
                ("plan", plan_name.clone()),
                ("method", generated.method.to_string()),
            ],
        );
        AttemptRecord::clear(&self.layout, &item.name);

        info!(
            item = %item.name,
            plan = %plan_name,
            method = %generated.method,
            domain,
            auto_approved,
            "plan created"
        );
        self.audit.record_at(now, "plan_created", &item.name, plan_name);
        Ok(Outcome::Processed)
    }

    /// Count a failed attempt. The entry goes back to the queue, or to
    /// `Failed` once it is out of attempts. An attempt that cannot be counted
    /// would allow endless retries, so it quarantines too.
    fn fail(&self, claim: Claim, error: &AideError, now: DateTime<Utc>) -> Result<Outcome> {
        let name = claim.name().to_string();
        let (record, persisted) = record_attempt(&self.layout, &name, &error.to_string(), now);
        if !persisted || record.attempts >= self.config.processor.max_attempts {
            self.quarantine(claim, record, now)?;
            return Ok(Outcome::Quarantined);
        }
        warn!(
            item = %name,
            attempts = record.attempts,
            max_attempts = self.config.processor.max_attempts,
            error = %error,
            "processing failed, will retry"
        );
        claim.release()?;
        self.audit.record_at(now, "attempt_failed", &name, error.to_string());
        Ok(Outcome::Failed)
    }

    fn quarantine(&self, claim: Claim, record: AttemptRecord, now: DateTime<Utc>) -> Result<()> {
        let name = claim.name().to_string();
        let dest = claim.complete_into(&self.layout.failed())?;
        io::annotate(
            &dest,
            "Processing failed",
            &[
                ("failed_at", now.to_rfc3339()),
                ("attempts", record.attempts.to_string()),
                ("last_error", record.last_error.clone()),
            ],
        );
        AttemptRecord::clear(&self.layout, &name);
        warn!(item = %name, attempts = record.attempts, error = %record.last_error, "item moved to Failed");
        self.audit.record_at(now, "item_failed", &name, record.last_error);
        Ok(())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl Component for ActionProcessor {
    fn name(&self) -> &str {
        "processor"
    }

    async fn tick(&mut self, cancel: &CancellationToken) -> Result<()> {
        let report = self.poll_once(cancel).await?;
        if report != ProcessReport::default() {
            info!(
                processed = report.processed,
                failed = report.failed,
                quarantined = report.quarantined,
                recovered = report.recovered,
                skipped = report.skipped,
                "poll complete"
            );
        }
        self.dashboard.refresh();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
