use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::{Config, ExecutorCommand};
use crate::error::{AideError, Result};
use crate::plan::Plan;

/// Longest slice of command output kept in a plan's execution log.
const MAX_DETAIL: usize = 2000;

// ─── Executor ─────────────────────────────────────────────────────────────

/// Result of running an approved plan. A failed run is still an outcome;
/// `Err` is reserved for not being able to run at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub detail: String,
}

/// Carries out an approved plan in one domain.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, plan: &Plan, path: &Path) -> Result<ExecutionOutcome>;
}

// ─── AcknowledgeExecutor ──────────────────────────────────────────────────

/// Default for domains with no configured command: the approval itself is
/// the action.
pub struct AcknowledgeExecutor;

#[async_trait]
impl Executor for AcknowledgeExecutor {
    fn name(&self) -> &str {
        "acknowledge"
    }

    async fn execute(&self, plan: &Plan, _path: &Path) -> Result<ExecutionOutcome> {
        Ok(ExecutionOutcome {
            success: true,
            detail: format!(
                "approved plan acknowledged (domain: {}, no executor configured)",
                plan.header.domain
            ),
        })
    }
}

// ─── CommandExecutor ──────────────────────────────────────────────────────

/// Runs an external command with the claimed plan's path as its last
/// argument. Exit 0 is success; stdout and stderr go into the outcome.
pub struct CommandExecutor {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ExecutorCommand, timeout: Duration) -> Self {
        Self::new(config.command.clone(), config.args.clone(), timeout)
    }

    async fn run(&self, path: &Path) -> Result<ExecutionOutcome> {
        let exe = which::which(&self.command).map_err(|e| {
            AideError::Execution(format!("'{}' not found: {e}", self.command))
        })?;
        let output = Command::new(exe)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut detail = match output.status.code() {
            Some(code) => format!("{} exited with code {code}", self.command),
            None => format!("{} terminated by signal", self.command),
        };
        if !stdout.trim().is_empty() {
            detail.push_str(&format!("\nstdout: {}", clip(stdout.trim())));
        }
        if !stderr.trim().is_empty() {
            detail.push_str(&format!("\nstderr: {}", clip(stderr.trim())));
        }
        Ok(ExecutionOutcome {
            success: output.status.success(),
            detail,
        })
    }
}

fn clip(text: &str) -> &str {
    match text.char_indices().nth(MAX_DETAIL) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    fn name(&self) -> &str {
        &self.command
    }

    async fn execute(&self, plan: &Plan, path: &Path) -> Result<ExecutionOutcome> {
        debug!(plan = %plan.name, command = %self.command, "running executor");
        tokio::time::timeout(self.timeout, self.run(path))
            .await
            .map_err(|_| AideError::Timeout {
                what: format!("{} for {}", self.command, plan.name),
                secs: self.timeout.as_secs(),
            })?
    }
}

// ─── ExecutorRegistry ─────────────────────────────────────────────────────

/// Maps plan domains to executors, with acknowledgement as the fallback.
pub struct ExecutorRegistry {
    by_domain: HashMap<String, Box<dyn Executor>>,
    fallback: AcknowledgeExecutor,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            by_domain: HashMap::new(),
            fallback: AcknowledgeExecutor,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let timeout = Duration::from_secs(config.approval.timeout_secs);
        let mut registry = Self::new();
        for (domain, command) in &config.approval.executors {
            registry.register(domain, Box::new(CommandExecutor::from_config(command, timeout)));
        }
        registry
    }

    pub fn register(&mut self, domain: impl Into<String>, executor: Box<dyn Executor>) {
        self.by_domain.insert(domain.into(), executor);
    }

    pub fn for_domain(&self, domain: &str) -> &dyn Executor {
        match self.by_domain.get(domain) {
            Some(e) => e.as_ref(),
            None => &self.fallback,
        }
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanHeader;

    fn plan(domain: &str) -> Plan {
        Plan {
            name: "PLAN_x.md".into(),
            header: PlanHeader {
                source_item: "x.md".into(),
                source_channel: "manual".into(),
                domain: domain.into(),
                generated_at: None,
                method: None,
                approved_at: None,
            },
            body: "do it".into(),
        }
    }

    #[tokio::test]
    async fn unknown_domain_is_acknowledged() {
        let registry = ExecutorRegistry::new();
        let exec = registry.for_domain("social");
        assert_eq!(exec.name(), "acknowledge");
        let outcome = exec.execute(&plan("social"), Path::new("/nonexistent")).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.detail.contains("social"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_receives_plan_path_and_reports_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("PLAN_x.md");
        std::fs::write(&path, "hello from the plan").unwrap();

        let exec = CommandExecutor::new("cat", vec![], Duration::from_secs(10));
        let outcome = exec.execute(&plan("general"), &path).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.detail.contains("exited with code 0"));
        assert!(outcome.detail.contains("hello from the plan"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_a_failed_outcome() {
        let exec = CommandExecutor::new("false", vec![], Duration::from_secs(10));
        let outcome = exec
            .execute(&plan("general"), Path::new("/dev/null"))
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        // The plan path lands in `$0`.
        let exec = CommandExecutor::new(
            "sh",
            vec!["-c".into(), "sleep 5".into()],
            Duration::from_millis(200),
        );
        let err = exec
            .execute(&plan("general"), Path::new("/dev/null"))
            .await
            .unwrap_err();
        assert!(matches!(err, AideError::Timeout { .. }));
    }
}
