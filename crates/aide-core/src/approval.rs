//! ApprovalOrchestrator: executes plans a human released into `Approved`.
//!
//! ```text
//! Plans ──(human)──▶ Approved ──executed──▶ Done (outcome annotated)
//!                        └──approval older than window──▶ Expired
//! ```
//!
//! Expiry is checked before execution and is a pure function of the plan's
//! `approved_at` and the poll time, so replaying a poll at the same instant
//! gives the same answer. Plans without `approved_at` are stamped on first
//! sighting. Only one orchestrator may run per vault.

use crate::audit::AuditLog;
use crate::claim::{self, Claim};
use crate::config::Config;
use crate::dashboard::DashboardUpdater;
use crate::error::{AideError, Result};
use crate::executor::{ExecutionOutcome, ExecutorRegistry};
use crate::io;
use crate::layout::VaultLayout;
use crate::plan::Plan;
use crate::runtime::Component;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorReport {
    pub executed: usize,
    /// Executed plans whose executor reported failure. Included in `executed`.
    pub failed: usize,
    pub expired: usize,
    /// Pending plans in `Plans` that were never approved in time.
    pub expired_pending: usize,
    /// Approved entries that could not be read as plans. Archived in `Done`
    /// unexecuted.
    pub malformed: usize,
    pub recovered: usize,
}

/// What a scan of `Approved` found.
struct ApprovedScan {
    ready: Vec<(DateTime<Utc>, Plan)>,
    malformed: Vec<(String, AideError)>,
}

pub struct ApprovalOrchestrator {
    config: Config,
    layout: VaultLayout,
    executors: ExecutorRegistry,
    audit: AuditLog,
    dashboard: DashboardUpdater,
}

impl ApprovalOrchestrator {
    pub fn new(config: Config, executors: ExecutorRegistry) -> Self {
        let layout = config.layout();
        Self {
            audit: AuditLog::new(layout.clone(), "orchestrator"),
            dashboard: DashboardUpdater::new(layout.clone()),
            layout,
            config,
            executors,
        }
    }

    pub fn from_config(config: Config) -> Self {
        let executors = ExecutorRegistry::from_config(&config);
        Self::new(config, executors)
    }

    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<OrchestratorReport> {
        self.poll_once_at(Utc::now(), cancel).await
    }

    pub async fn poll_once_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<OrchestratorReport> {
        let approved_dir = self.layout.approved();
        let window = self.config.expiration_window();
        let recovered =
            claim::recover_stale(&approved_dir, self.config.claim_grace(), SystemTime::from(now))?;
        let mut report = OrchestratorReport {
            recovered: recovered.len(),
            ..OrchestratorReport::default()
        };

        if self.config.approval.expire_pending {
            report.expired_pending = self.expire_pending(now)?;
        }

        let scan = self.scan_approved(now)?;
        for (name, error) in scan.malformed {
            if cancel.is_cancelled() {
                return Ok(report);
            }
            if self.archive_malformed(&name, &error, now)? {
                report.malformed += 1;
            }
        }

        for (approved_at, plan) in scan.ready {
            if cancel.is_cancelled() {
                break;
            }
            let Some(claim) = Claim::acquire(&approved_dir, &plan.name)? else {
                continue;
            };

            if now - approved_at >= window {
                let dest = claim.complete_into(&self.layout.expired())?;
                io::append_trailer(
                    &dest,
                    "Expired",
                    &[
                        ("expired_at", now.to_rfc3339()),
                        ("approved_at", approved_at.to_rfc3339()),
                        (
                            "reason",
                            format!(
                                "approved more than {}h ago without being executed",
                                self.config.approval.expiration_hours
                            ),
                        ),
                    ],
                )?;
                warn!(plan = %plan.name, approved_at = %approved_at, "approved plan expired");
                self.audit.record_at(now, "plan_expired", &plan.name, "approval window elapsed");
                report.expired += 1;
                continue;
            }

            let (outcome_label, executor_name, detail) = self.execute(&plan, &claim).await;
            let dest = claim.complete_into(&self.layout.done())?;
            io::append_trailer(
                &dest,
                "Execution log",
                &[
                    ("executed_at", now.to_rfc3339()),
                    ("executor", executor_name),
                    ("outcome", outcome_label.to_string()),
                    ("detail", detail.clone()),
                ],
            )?;
            report.executed += 1;
            if outcome_label == "failed" {
                report.failed += 1;
                warn!(plan = %plan.name, detail = %detail, "plan execution failed");
            } else {
                info!(plan = %plan.name, outcome = outcome_label, "plan executed");
            }
            self.audit.record_at(now, "plan_executed", &plan.name, outcome_label);
        }

        Ok(report)
    }

    /// Run the domain executor. Never fails: an executor error becomes a
    /// `failed` outcome so the plan still reaches `Done`.
    async fn execute(&self, plan: &Plan, claim: &Claim) -> (&'static str, String, String) {
        let executor = self.executors.for_domain(&plan.header.domain);
        if self.config.dry_run {
            return (
                "dry_run",
                executor.name().to_string(),
                "dry run: executor not invoked".to_string(),
            );
        }
        match executor.execute(plan, claim.path()).await {
            Ok(ExecutionOutcome { success: true, detail }) => {
                ("success", executor.name().to_string(), detail)
            }
            Ok(ExecutionOutcome { success: false, detail }) => {
                ("failed", executor.name().to_string(), detail)
            }
            Err(e) => ("failed", executor.name().to_string(), e.to_string()),
        }
    }

    /// Plans in `Approved` with their approval time, oldest first, and the
    /// entries that do not parse. Plans seen for the first time without
    /// `approved_at` are stamped with `now`.
    fn scan_approved(&self, now: DateTime<Utc>) -> Result<ApprovedScan> {
        let dir = self.layout.approved();
        let mut ready = Vec::new();
        let mut malformed = Vec::new();
        for name in io::list_queue(&dir)? {
            let path = dir.join(&name);
            let mut plan = match Plan::load(&path, &name) {
                Ok(p) => p,
                Err(AideError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    malformed.push((name, e));
                    continue;
                }
            };
            let approved_at = match plan.header.approved_at {
                Some(at) => at,
                None => {
                    plan.header.approved_at = Some(now);
                    plan.save(&path)?;
                    info!(plan = %name, "stamped approval time");
                    now
                }
            };
            ready.push((approved_at, plan));
        }
        ready.sort_by(|(a, pa), (b, pb)| a.cmp(b).then_with(|| pa.name.cmp(&pb.name)));
        Ok(ApprovedScan { ready, malformed })
    }

    /// Archive an approved entry that is not a readable plan into `Done`
    /// without executing it. Returns false if another process claimed it.
    fn archive_malformed(&self, name: &str, error: &AideError, now: DateTime<Utc>) -> Result<bool> {
        let Some(claim) = Claim::acquire(&self.layout.approved(), name)? else {
            return Ok(false);
        };
        let dest = claim.complete_into(&self.layout.done())?;
        let detail = format!("malformed plan, not executed: {error}");
        io::annotate(
            &dest,
            "Execution log",
            &[
                ("executed_at", now.to_rfc3339()),
                ("executor", "none".to_string()),
                ("outcome", "failed".to_string()),
                ("detail", detail.clone()),
            ],
        );
        warn!(plan = %name, error = %error, "malformed approved plan archived without execution");
        self.audit.record_at(now, "plan_malformed", name, detail);
        Ok(true)
    }

    fn expire_pending(&self, now: DateTime<Utc>) -> Result<usize> {
        let dir = self.layout.plans();
        let window = self.config.expiration_window();
        let mut expired = 0;
        for name in io::list_queue(&dir)? {
            let path = dir.join(&name);
            // An unreadable plan still ages, from its file time.
            let generated_at = match Plan::load(&path, &name) {
                Ok(plan) => plan.generated_at(),
                Err(_) => match std::fs::metadata(&path).and_then(|m| m.modified()) {
                    Ok(modified) => DateTime::<Utc>::from(modified),
                    Err(_) => continue,
                },
            };
            if now - generated_at < window {
                continue;
            }
            let Some(claim) = Claim::acquire(&dir, &name)? else {
                continue;
            };
            let dest = claim.complete_into(&self.layout.expired())?;
            io::annotate(
                &dest,
                "Expired",
                &[
                    ("expired_at", now.to_rfc3339()),
                    ("generated_at", generated_at.to_rfc3339()),
                    ("reason", "not approved within window".to_string()),
                ],
            );
            info!(plan = %name, "pending plan expired");
            self.audit.record_at(now, "plan_expired", &name, "not approved within window");
            expired += 1;
        }
        Ok(expired)
    }
}

#[async_trait]
impl Component for ApprovalOrchestrator {
    fn name(&self) -> &str {
        "orchestrator"
    }

    async fn tick(&mut self, cancel: &CancellationToken) -> Result<()> {
        let report = self.poll_once(cancel).await?;
        if report != OrchestratorReport::default() {
            info!(
                executed = report.executed,
                failed = report.failed,
                expired = report.expired,
                expired_pending = report.expired_pending,
                malformed = report.malformed,
                recovered = report.recovered,
                "poll complete"
            );
        }
        self.dashboard.refresh();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Operator actions
// ---------------------------------------------------------------------------

/// Release a pending plan: stamp `approved_at` and move it from `Plans` to
/// `Approved`.
pub fn approve_plan(layout: &VaultLayout, name: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    let claim = claim_pending(layout, name)?;
    let mut plan = Plan::load(claim.path(), name)?;
    plan.header.approved_at = Some(now);
    plan.save(claim.path())?;
    let dest = claim.complete_into(&layout.approved())?;
    AuditLog::new(layout.clone(), "operator").record_at(now, "plan_approved", name, "");
    Ok(dest)
}

/// Turn down a pending plan. It is archived in `Done` with the reason.
pub fn reject_plan(
    layout: &VaultLayout,
    name: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let claim = claim_pending(layout, name)?;
    let dest = claim.complete_into(&layout.done())?;
    io::append_trailer(
        &dest,
        "Review",
        &[
            ("outcome", "rejected".to_string()),
            ("rejected_at", now.to_rfc3339()),
            ("reason", reason.to_string()),
        ],
    )?;
    AuditLog::new(layout.clone(), "operator").record_at(now, "plan_rejected", name, reason);
    Ok(dest)
}

fn claim_pending(layout: &VaultLayout, name: &str) -> Result<Claim> {
    let name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AideError::PlanNotFound(name.to_string()))?;
    Claim::acquire(&layout.plans(), name)?.ok_or_else(|| AideError::PlanNotFound(name.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::plan::PlanHeader;
    use chrono::{Duration, TimeZone};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct Recording {
        seen: Arc<Mutex<Vec<String>>>,
        succeed: bool,
    }

    #[async_trait]
    impl Executor for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn execute(&self, plan: &Plan, path: &Path) -> Result<ExecutionOutcome> {
            assert!(path.exists());
            self.seen.lock().unwrap().push(plan.name.clone());
            Ok(ExecutionOutcome {
                success: self.succeed,
                detail: if self.succeed { "sent".into() } else { "smtp refused".into() },
            })
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn setup(succeed: bool) -> (TempDir, Config, ApprovalOrchestrator, Arc<Mutex<Vec<String>>>) {
        let dir = TempDir::new().unwrap();
        let config = Config::new(dir.path());
        config.layout().ensure().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ExecutorRegistry::new();
        registry.register(
            "general",
            Box::new(Recording {
                seen: Arc::clone(&seen),
                succeed,
            }),
        );
        let orchestrator = ApprovalOrchestrator::new(config.clone(), registry);
        (dir, config, orchestrator, seen)
    }

    fn plan(name: &str, approved_at: Option<DateTime<Utc>>) -> Plan {
        Plan {
            name: name.into(),
            header: PlanHeader {
                source_item: "task.md".into(),
                source_channel: "manual".into(),
                domain: "general".into(),
                generated_at: Some(t0()),
                method: None,
                approved_at,
            },
            body: "Do the thing.".into(),
        }
    }

    #[tokio::test]
    async fn stale_approval_expires_without_execution() {
        let (_dir, config, orch, seen) = setup(true);
        let layout = config.layout();
        plan("PLAN_a.md", Some(t0())).deposit(&layout.approved()).unwrap();

        let report = orch
            .poll_once_at(t0() + Duration::hours(25), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.expired, 1);
        assert!(seen.lock().unwrap().is_empty());
        let text = std::fs::read_to_string(layout.expired().join("PLAN_a.md")).unwrap();
        assert!(text.contains("## Expired"));
        assert!(!layout.approved().join("PLAN_a.md").exists());
    }

    #[tokio::test]
    async fn fresh_approval_executes_into_done() {
        let (_dir, config, orch, seen) = setup(true);
        let layout = config.layout();
        plan("PLAN_a.md", Some(t0())).deposit(&layout.approved()).unwrap();

        let report = orch
            .poll_once_at(t0() + Duration::hours(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(*seen.lock().unwrap(), vec!["PLAN_a.md".to_string()]);
        let text = std::fs::read_to_string(layout.done().join("PLAN_a.md")).unwrap();
        assert!(text.contains("- outcome: success"));
        assert!(text.contains("- detail: sent"));
    }

    #[tokio::test]
    async fn expiry_boundary_is_inclusive() {
        let (_dir, config, orch, _seen) = setup(true);
        let layout = config.layout();
        plan("PLAN_a.md", Some(t0())).deposit(&layout.approved()).unwrap();

        let report = orch
            .poll_once_at(t0() + Duration::hours(24), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.expired, 1);
    }

    #[tokio::test]
    async fn executes_oldest_approval_first() {
        let (_dir, config, orch, seen) = setup(true);
        let layout = config.layout();
        plan("PLAN_c.md", Some(t0())).deposit(&layout.approved()).unwrap();
        plan("PLAN_a.md", Some(t0() + Duration::minutes(2))).deposit(&layout.approved()).unwrap();
        plan("PLAN_b.md", Some(t0() + Duration::minutes(1))).deposit(&layout.approved()).unwrap();

        orch.poll_once_at(t0() + Duration::hours(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["PLAN_c.md".to_string(), "PLAN_b.md".into(), "PLAN_a.md".into()]
        );
    }

    #[tokio::test]
    async fn failed_execution_still_lands_in_done() {
        let (_dir, config, orch, _seen) = setup(false);
        let layout = config.layout();
        plan("PLAN_a.md", Some(t0())).deposit(&layout.approved()).unwrap();

        let report = orch
            .poll_once_at(t0() + Duration::hours(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        let text = std::fs::read_to_string(layout.done().join("PLAN_a.md")).unwrap();
        assert!(text.contains("- outcome: failed"));
        assert!(text.contains("smtp refused"));

        // Once in Done it is never considered again, not even for expiry.
        let later = orch
            .poll_once_at(t0() + Duration::hours(48), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(later, OrchestratorReport::default());
        assert!(layout.done().join("PLAN_a.md").exists());
    }

    #[tokio::test]
    async fn missing_approval_time_is_stamped() {
        let (_dir, mut config, _orch, seen) = setup(true);
        config.dry_run = true;
        let layout = config.layout();
        plan("PLAN_a.md", None).deposit(&layout.approved()).unwrap();

        let orch = ApprovalOrchestrator::new(config, ExecutorRegistry::new());
        orch.poll_once_at(t0(), &CancellationToken::new()).await.unwrap();
        let done = Plan::load(&layout.done().join("PLAN_a.md"), "PLAN_a.md").unwrap();
        assert_eq!(done.header.approved_at, Some(t0()));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dry_run_skips_executor() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::new(dir.path());
        config.dry_run = true;
        config.layout().ensure().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ExecutorRegistry::new();
        registry.register(
            "general",
            Box::new(Recording {
                seen: Arc::clone(&seen),
                succeed: true,
            }),
        );
        let layout = config.layout();
        plan("PLAN_a.md", Some(t0())).deposit(&layout.approved()).unwrap();

        let orch = ApprovalOrchestrator::new(config, registry);
        orch.poll_once_at(t0() + Duration::hours(1), &CancellationToken::new())
            .await
            .unwrap();
        assert!(seen.lock().unwrap().is_empty());
        let text = std::fs::read_to_string(layout.done().join("PLAN_a.md")).unwrap();
        assert!(text.contains("- outcome: dry_run"));
    }

    #[tokio::test]
    async fn unapproved_plans_expire_when_enabled() {
        let (_dir, config, orch, _seen) = setup(true);
        let layout = config.layout();
        plan("PLAN_old.md", None).deposit(&layout.plans()).unwrap();

        let report = orch
            .poll_once_at(t0() + Duration::hours(30), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.expired_pending, 1);
        let text = std::fs::read_to_string(layout.expired().join("PLAN_old.md")).unwrap();
        assert!(text.contains("not approved within window"));
    }

    #[test]
    fn approve_then_reject_helpers() {
        let dir = TempDir::new().unwrap();
        let layout = VaultLayout::new(dir.path());
        layout.ensure().unwrap();
        plan("PLAN_yes.md", None).deposit(&layout.plans()).unwrap();
        plan("PLAN_no.md", None).deposit(&layout.plans()).unwrap();

        approve_plan(&layout, "PLAN_yes.md", t0()).unwrap();
        let approved = Plan::load(&layout.approved().join("PLAN_yes.md"), "PLAN_yes.md").unwrap();
        assert_eq!(approved.header.approved_at, Some(t0()));

        reject_plan(&layout, "Plans/PLAN_no.md", "not needed", t0()).unwrap();
        let text = std::fs::read_to_string(layout.done().join("PLAN_no.md")).unwrap();
        assert!(text.contains("- outcome: rejected"));

        let err = approve_plan(&layout, "PLAN_missing.md", t0()).unwrap_err();
        assert!(matches!(err, AideError::PlanNotFound(_)));
    }

    #[tokio::test]
    async fn malformed_approved_plan_is_archived_not_stuck() {
        let (_dir, config, orch, seen) = setup(true);
        let layout = config.layout();
        std::fs::write(layout.approved().join("PLAN_bad.md"), "---\n: [unclosed\n---\nbody").unwrap();
        std::fs::write(layout.approved().join("PLAN_bin.md"), [0xff, 0xfe, 0x00]).unwrap();
        plan("PLAN_ok.md", Some(t0())).deposit(&layout.approved()).unwrap();

        let report = orch
            .poll_once_at(t0() + Duration::hours(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.malformed, 2);
        assert_eq!(report.executed, 1);
        assert_eq!(*seen.lock().unwrap(), vec!["PLAN_ok.md".to_string()]);
        assert!(io::list_queue(&layout.approved()).unwrap().is_empty());

        let text = std::fs::read_to_string(layout.done().join("PLAN_bad.md")).unwrap();
        assert!(text.contains("- outcome: failed"));
        assert!(text.contains("malformed plan"));
        assert_eq!(
            std::fs::read(layout.done().join("PLAN_bin.md")).unwrap(),
            vec![0xff, 0xfe, 0x00]
        );
    }

    #[tokio::test]
    async fn malformed_pending_plan_still_expires() {
        let (_dir, config, orch, _seen) = setup(true);
        let layout = config.layout();
        std::fs::write(layout.plans().join("PLAN_bad.md"), "---\n: [unclosed\n---\nbody").unwrap();

        let cancel = CancellationToken::new();
        let early = orch.poll_once_at(Utc::now(), &cancel).await.unwrap();
        assert_eq!(early.expired_pending, 0);

        let report = orch
            .poll_once_at(Utc::now() + Duration::hours(25), &cancel)
            .await
            .unwrap();
        assert_eq!(report.expired_pending, 1);
        let text = std::fs::read_to_string(layout.expired().join("PLAN_bad.md")).unwrap();
        assert!(text.contains("not approved within window"));
    }

    #[tokio::test]
    async fn orphaned_approved_claim_is_recovered_and_executed() {
        let (_dir, config, orch, seen) = setup(true);
        let layout = config.layout();
        plan("PLAN_a.md", Some(Utc::now())).deposit(&layout.approved()).unwrap();
        drop(Claim::acquire(&layout.approved(), "PLAN_a.md").unwrap().unwrap());

        let cancel = CancellationToken::new();
        let early = orch.poll_once_at(Utc::now(), &cancel).await.unwrap();
        assert_eq!(early.recovered, 0);
        assert_eq!(early.executed, 0);
        assert!(seen.lock().unwrap().is_empty());

        let report = orch
            .poll_once_at(Utc::now() + Duration::minutes(11), &cancel)
            .await
            .unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.executed, 1);
        assert_eq!(*seen.lock().unwrap(), vec!["PLAN_a.md".to_string()]);
        assert!(layout.done().join("PLAN_a.md").exists());
        assert!(claim::list_claimed(&layout.approved()).unwrap().is_empty());
    }
}
