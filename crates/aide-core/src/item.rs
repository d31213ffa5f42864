//! Action items: units of incoming work waiting in `Needs_Action`.
//!
//! An item's identity is its file name. The header is optional so that a
//! person (or any tool) can drop a plain text file into the folder.

use crate::document;
use crate::error::Result;
use crate::io;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Source channel used for items that arrive without a header.
pub const MANUAL_SOURCE: &str = "manual";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemHeader {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

fn default_source() -> String {
    MANUAL_SOURCE.to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionItem {
    pub name: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub external_id: Option<String>,
    pub body: String,
}

impl ActionItem {
    pub fn new(name: impl Into<String>, source: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            created_at: Utc::now(),
            subject: None,
            sender: None,
            external_id: None,
            body: body.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    /// Load an item from `path`. The file may currently carry a claim suffix;
    /// `name` is the item's identity regardless.
    ///
    /// Non-UTF-8 payloads are summarized rather than rejected. Items without a
    /// header take their creation time from the file's mtime.
    pub fn load(path: &Path, name: &str) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let (header, body) = match String::from_utf8(bytes) {
            Ok(text) => document::parse::<ItemHeader>(&text, name)?,
            Err(e) => (
                None,
                format!("(binary payload, {} bytes)", e.as_bytes().len()),
            ),
        };
        let header = header.unwrap_or(ItemHeader {
            source: default_source(),
            created_at: None,
            subject: None,
            sender: None,
            external_id: None,
        });
        let created_at = match header.created_at {
            Some(ts) => ts,
            None => std::fs::metadata(path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        };
        Ok(Self {
            name: name.to_string(),
            source: header.source,
            created_at,
            subject: header.subject,
            sender: header.sender,
            external_id: header.external_id,
            body,
        })
    }

    pub fn header(&self) -> ItemHeader {
        ItemHeader {
            source: self.source.clone(),
            created_at: Some(self.created_at),
            subject: self.subject.clone(),
            sender: self.sender.clone(),
            external_id: self.external_id.clone(),
        }
    }

    pub fn render(&self) -> Result<String> {
        document::render(&self.header(), &self.body)
    }

    /// Atomically place this item into `dir` (normally `Needs_Action`). The
    /// name gets a numeric suffix if an entry with that name already exists.
    pub fn deposit(&self, dir: &Path) -> Result<PathBuf> {
        io::ensure_dir(dir)?;
        let path = io::unique_path(dir, &self.name);
        io::atomic_write(&path, self.render()?.as_bytes())?;
        Ok(path)
    }

    /// File stem used to name derived artifacts.
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn headerless_item_is_manual() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("task_invoice.txt");
        std::fs::write(&path, "create an invoice for Client A").unwrap();

        let item = ActionItem::load(&path, "task_invoice.txt").unwrap();
        assert_eq!(item.source, MANUAL_SOURCE);
        assert_eq!(item.body, "create an invoice for Client A");
        assert_eq!(item.stem(), "task_invoice");
    }

    #[test]
    fn deposit_then_load_keeps_metadata() {
        let dir = TempDir::new().unwrap();
        let item = ActionItem::new("EMAIL_42.md", "mailbox", "Please send the Q3 report")
            .with_subject("Q3 report")
            .with_sender("boss@example.com")
            .with_external_id("42");
        let path = item.deposit(dir.path()).unwrap();

        let loaded = ActionItem::load(&path, "EMAIL_42.md").unwrap();
        assert_eq!(loaded.source, "mailbox");
        assert_eq!(loaded.subject.as_deref(), Some("Q3 report"));
        assert_eq!(loaded.sender.as_deref(), Some("boss@example.com"));
        assert_eq!(loaded.external_id.as_deref(), Some("42"));
        assert!(loaded.body.contains("Q3 report"));
    }

    #[test]
    fn deposit_does_not_clobber() {
        let dir = TempDir::new().unwrap();
        let a = ActionItem::new("same.md", "manual", "one");
        let b = ActionItem::new("same.md", "manual", "two");
        let pa = a.deposit(dir.path()).unwrap();
        let pb = b.deposit(dir.path()).unwrap();
        assert_ne!(pa, pb);
        assert!(std::fs::read_to_string(pa).unwrap().contains("one"));
        assert!(std::fs::read_to_string(pb).unwrap().contains("two"));
    }

    #[test]
    fn binary_payload_is_summarized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x01]).unwrap();
        let item = ActionItem::load(&path, "scan.pdf").unwrap();
        assert!(item.body.contains("4 bytes"));
    }
}
