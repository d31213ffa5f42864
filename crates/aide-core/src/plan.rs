//! Plans: generated instructions for an action item, waiting in `Plans` for a
//! human to release them into `Approved`.

use crate::document;
use crate::error::Result;
use crate::generator::GenerationMethod;
use crate::io;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const GENERAL_DOMAIN: &str = "general";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanHeader {
    /// File name of the originating action item.
    #[serde(default)]
    pub source_item: String,
    #[serde(default)]
    pub source_channel: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<GenerationMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

fn default_domain() -> String {
    GENERAL_DOMAIN.to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub name: String,
    pub header: PlanHeader,
    pub body: String,
}

impl Plan {
    /// File name for a plan generated from `item_stem` at `at`.
    pub fn file_name(item_stem: &str, at: DateTime<Utc>) -> String {
        format!("PLAN_{}_{}.md", item_stem, at.format("%Y%m%dT%H%M%S"))
    }

    /// Load a plan. Hand-written plans without a header are accepted; they get
    /// the general domain and their mtime as generation time.
    pub fn load(path: &Path, name: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let (header, body) = document::parse::<PlanHeader>(&text, name)?;
        let mut header = header.unwrap_or(PlanHeader {
            source_item: String::new(),
            source_channel: String::new(),
            domain: default_domain(),
            generated_at: None,
            method: None,
            approved_at: None,
        });
        if header.generated_at.is_none() {
            header.generated_at = std::fs::metadata(path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .ok();
        }
        Ok(Self {
            name: name.to_string(),
            header,
            body,
        })
    }

    pub fn render(&self) -> Result<String> {
        document::render(&self.header, &self.body)
    }

    /// Atomically rewrite the plan at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        io::atomic_write(path, self.render()?.as_bytes())
    }

    /// Atomically place the plan into `dir` under a free name.
    pub fn deposit(&self, dir: &Path) -> Result<PathBuf> {
        io::ensure_dir(dir)?;
        let path = io::unique_path(dir, &self.name);
        self.save(&path)?;
        Ok(path)
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.header.generated_at.unwrap_or_default()
    }
}

/// Pick the executor domain for a payload from keywords in its text.
pub fn infer_domain(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["invoice", "payment", "accounting"]) {
        "accounting"
    } else if has(&["email", "reply"]) {
        "email"
    } else if has(&["post", "linkedin", "social"]) {
        "social"
    } else {
        GENERAL_DOMAIN
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample() -> Plan {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        Plan {
            name: Plan::file_name("task_invoice", at),
            header: PlanHeader {
                source_item: "task_invoice.txt".into(),
                source_channel: "manual".into(),
                domain: "accounting".into(),
                generated_at: Some(at),
                method: Some(GenerationMethod::Simulate),
                approved_at: None,
            },
            body: "# Plan\n\nInvoice Client A".into(),
        }
    }

    #[test]
    fn file_name_format() {
        assert_eq!(sample().name, "PLAN_task_invoice_20260301T093000.md");
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let plan = sample();
        let path = plan.deposit(dir.path()).unwrap();
        let loaded = Plan::load(&path, &plan.name).unwrap();
        assert_eq!(loaded.header, plan.header);
        assert!(loaded.body.contains("Client A"));
    }

    #[test]
    fn headerless_plan_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manual_plan.md");
        std::fs::write(&path, "Call the accountant").unwrap();
        let plan = Plan::load(&path, "manual_plan.md").unwrap();
        assert_eq!(plan.header.domain, GENERAL_DOMAIN);
        assert!(plan.header.generated_at.is_some());
        assert!(plan.header.approved_at.is_none());
    }

    #[test]
    fn domain_inference() {
        assert_eq!(infer_domain("create an invoice for Client A"), "accounting");
        assert_eq!(infer_domain("Reply to Sam"), "email");
        assert_eq!(infer_domain("Draft a LinkedIn post"), "social");
        assert_eq!(infer_domain("water the plants"), GENERAL_DOMAIN);
    }
}
