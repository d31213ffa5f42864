//! Append-only JSON-lines audit trail under `Logs/<yyyy-mm-dd>.jsonl`.
//!
//! One line per stage transition. Writes are best-effort: a failed audit
//! write is logged and never interrupts the pipeline.

use crate::io;
use crate::layout::VaultLayout;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub event: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    layout: VaultLayout,
    component: String,
}

impl AuditLog {
    pub fn new(layout: VaultLayout, component: impl Into<String>) -> Self {
        Self {
            layout,
            component: component.into(),
        }
    }

    pub fn record(&self, event: &str, subject: &str, detail: impl Into<String>) {
        self.record_at(Utc::now(), event, subject, detail);
    }

    pub fn record_at(&self, at: DateTime<Utc>, event: &str, subject: &str, detail: impl Into<String>) {
        let entry = AuditEvent {
            timestamp: at,
            component: self.component.clone(),
            event: event.to_string(),
            subject: subject.to_string(),
            detail: detail.into(),
        };
        let path = self
            .layout
            .logs()
            .join(format!("{}.jsonl", at.format("%Y-%m-%d")));
        let result = serde_json::to_string(&entry)
            .map_err(crate::error::AideError::from)
            .and_then(|line| {
                io::ensure_dir(&self.layout.logs())?;
                io::append_text(&path, &format!("{line}\n"))
            });
        if let Err(e) = result {
            warn!(event, subject, error = %e, "audit write failed");
        }
    }
}

/// Read back all events recorded on `day`'s log.
pub fn read_day(layout: &VaultLayout, day: DateTime<Utc>) -> Vec<AuditEvent> {
    let path = layout.logs().join(format!("{}.jsonl", day.format("%Y-%m-%d")));
    let Ok(text) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn events_append_as_json_lines() {
        let dir = TempDir::new().unwrap();
        let layout = VaultLayout::new(dir.path());
        let log = AuditLog::new(layout.clone(), "processor");
        log.record("plan_created", "task.txt", "PLAN_task.md");
        log.record("item_done", "task.txt", "");

        let events = read_day(&layout, Utc::now());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].component, "processor");
        assert_eq!(events[0].event, "plan_created");
        assert_eq!(events[1].detail, "");
    }
}
