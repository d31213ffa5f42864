//! Per-watcher supervision records in `.state/watchers/<id>.yaml`.
//!
//! The external supervisor restarts a watcher process whenever it exits
//! non-zero. The restart count has to survive that, so it lives on disk: a
//! process that starts and finds its record in any state other than
//! `stopped` knows the previous process died and counts itself as a restart.

use super::WatcherKind;
use crate::error::Result;
use crate::io::atomic_write;
use crate::layout::VaultLayout;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherStatus {
    Starting,
    Running,
    Crashed,
    Stopped,
}

impl fmt::Display for WatcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WatcherStatus::Starting => "starting",
            WatcherStatus::Running => "running",
            WatcherStatus::Crashed => "crashed",
            WatcherStatus::Stopped => "stopped",
        })
    }
}

// ---------------------------------------------------------------------------
// WatcherInstance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherInstance {
    pub id: String,
    pub kind: WatcherKind,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_poll_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub restart_count: u32,
    pub status: WatcherStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub items_emitted: u64,
    #[serde(skip)]
    path: PathBuf,
}

impl WatcherInstance {
    /// Load (or create) the record for `id` and mark this process as started.
    pub fn record_start(layout: &VaultLayout, id: &str, kind: WatcherKind) -> Result<Self> {
        Self::record_start_at(layout, id, kind, std::process::id(), Utc::now())
    }

    pub fn record_start_at(
        layout: &VaultLayout,
        id: &str,
        kind: WatcherKind,
        pid: u32,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let path = layout.watcher_record_path(id);
        let previous = load(&path)?;
        let restart_count = match &previous {
            Some(p) if p.status == WatcherStatus::Stopped => p.restart_count,
            Some(p) => p.restart_count + 1,
            None => 0,
        };
        let (last_poll_at, last_error, items_emitted) = match previous {
            Some(p) => (p.last_poll_at, p.last_error, p.items_emitted),
            None => (None, None, 0),
        };
        let record = WatcherInstance {
            id: id.to_string(),
            kind,
            pid,
            started_at: now,
            last_poll_at,
            consecutive_failures: 0,
            restart_count,
            status: WatcherStatus::Starting,
            last_error,
            items_emitted,
            path,
        };
        record.save()?;
        Ok(record)
    }

    pub fn record_running(&mut self) -> Result<()> {
        self.status = WatcherStatus::Running;
        self.save()
    }

    pub fn record_success(&mut self, emitted: usize, now: DateTime<Utc>) -> Result<()> {
        self.status = WatcherStatus::Running;
        self.last_poll_at = Some(now);
        self.consecutive_failures = 0;
        self.items_emitted += emitted as u64;
        self.save()
    }

    pub fn record_failure(&mut self, error: &str) -> Result<()> {
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
        self.save()
    }

    /// Best-effort last write before the process exits non-zero.
    pub fn record_crash(&mut self, error: &str) {
        self.status = WatcherStatus::Crashed;
        self.last_error = Some(error.to_string());
        if let Err(e) = self.save() {
            tracing::warn!(watcher = %self.id, error = %e, "could not record crash");
        }
    }

    pub fn record_stop(&mut self) -> Result<()> {
        self.status = WatcherStatus::Stopped;
        self.save()
    }

    fn save(&self) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(&self.path, data.as_bytes())
    }

    /// A record claiming to be live whose process is gone. Only detectable
    /// on Unix; elsewhere this is always false.
    pub fn is_stale(&self) -> bool {
        matches!(self.status, WatcherStatus::Starting | WatcherStatus::Running)
            && !is_pid_alive(self.pid)
    }
}

fn load(path: &std::path::Path) -> Result<Option<WatcherInstance>> {
    match std::fs::read_to_string(path) {
        Ok(data) => {
            let mut record: WatcherInstance = serde_yaml::from_str(&data)?;
            record.path = path.to_path_buf();
            Ok(Some(record))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Every record under `.state/watchers`, sorted by id. Unreadable records
/// are skipped.
pub fn load_all(layout: &VaultLayout) -> Result<Vec<WatcherInstance>> {
    let dir = layout.watchers_state();
    let mut records = Vec::new();
    for name in crate::io::list_matching(&dir, |n| n.ends_with(".yaml") && !n.starts_with('.'))? {
        match load(&dir.join(&name)) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) => tracing::warn!(file = %name, error = %e, "skipping unreadable watcher record"),
        }
    }
    records.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(records)
}

// ---------------------------------------------------------------------------
// PID helpers
// ---------------------------------------------------------------------------

/// Returns true if the process is still alive (`kill -0 {pid}`).
fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
