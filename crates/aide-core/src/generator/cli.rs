use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{prompt_for, GeneratedPlan, GenerationMethod, PlanGenerator, SYSTEM_PROMPT};
use crate::config::GeneratorConfig;
use crate::error::{AideError, Result};
use crate::item::ActionItem;

// ─── CliGenerator ─────────────────────────────────────────────────────────

/// Runs a local AI CLI (by default `claude --print`) as a one-shot
/// subprocess. The prompt goes in on stdin; trimmed stdout is the plan.
///
/// The child is killed if the timeout elapses or the future is dropped
/// (e.g. on shutdown).
pub struct CliGenerator {
    executable: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CliGenerator {
    pub fn new(executable: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &GeneratorConfig, timeout: Duration) -> Self {
        Self::new(config.cli_executable.clone(), config.cli_args.clone(), timeout)
    }

    async fn run(&self, input: String) -> Result<String> {
        let exe = which::which(&self.executable).map_err(|e| {
            AideError::Generation(format!("'{}' not found on PATH: {e}", self.executable))
        })?;

        let mut cmd = Command::new(exe);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Allow running from inside another agent session.
        cmd.env_remove("CLAUDECODE");

        let mut child = cmd.spawn()?;

        // Feed stdin from a task so a chatty child can't deadlock us on a
        // full stdout pipe.
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                let _ = stdin.write_all(input.as_bytes()).await;
                let _ = stdin.shutdown().await;
            });
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let msg = match output.status.code() {
                Some(code) => format!("{} exited with code {code}", self.executable),
                None => format!("{} terminated by signal", self.executable),
            };
            return Err(AideError::Generation(if stderr.trim().is_empty() {
                msg
            } else {
                format!("{msg}\nstderr: {}", stderr.trim())
            }));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            return Err(AideError::Generation(format!(
                "{} produced no output",
                self.executable
            )));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl PlanGenerator for CliGenerator {
    fn method(&self) -> GenerationMethod {
        GenerationMethod::Cli
    }

    async fn generate(&self, item: &ActionItem) -> Result<GeneratedPlan> {
        let input = format!("{SYSTEM_PROMPT}\n\n{}", prompt_for(item));
        debug!(item = %item.name, exe = %self.executable, "invoking plan CLI");
        let body = tokio::time::timeout(self.timeout, self.run(input))
            .await
            .map_err(|_| AideError::Timeout {
                what: format!("{} for {}", self.executable, item.name),
                secs: self.timeout.as_secs(),
            })??;
        Ok(GeneratedPlan {
            body,
            method: GenerationMethod::Cli,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn item() -> ActionItem {
        ActionItem::new("task.txt", "manual", "create an invoice for Client A")
    }

    #[tokio::test]
    async fn stdout_becomes_plan_body() {
        // `cat` echoes the prompt back, which is enough to check the plumbing.
        let gen = CliGenerator::new("cat", vec![], Duration::from_secs(10));
        let plan = gen.generate(&item()).await.unwrap();
        assert_eq!(plan.method, GenerationMethod::Cli);
        assert!(plan.body.contains("Client A"));
        assert!(plan.body.contains("execution plan"));
    }

    #[tokio::test]
    async fn missing_executable_fails() {
        let gen = CliGenerator::new("definitely-not-a-real-binary-xyz", vec![], Duration::from_secs(5));
        let err = gen.generate(&item()).await.unwrap_err();
        assert!(matches!(err, AideError::Generation(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn nonzero_exit_fails() {
        let gen = CliGenerator::new("false", vec![], Duration::from_secs(5));
        let err = gen.generate(&item()).await.unwrap_err();
        assert!(err.to_string().contains("exited with code"), "got {err}");
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let gen = CliGenerator::new("sleep", vec!["5".into()], Duration::from_millis(200));
        let err = gen.generate(&item()).await.unwrap_err();
        assert!(matches!(err, AideError::Timeout { .. }), "got {err:?}");
    }
}
