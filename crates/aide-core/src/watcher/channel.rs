//! Spool-backed channel watchers: mailbox, messaging, professional network.
//!
//! Talking to the actual services is someone else's job. A fetcher drops one
//! JSON file per message into `.spool/<kind>/`:
//!
//! ```json
//! {"id": "18c2f", "from": "client@example.com", "subject": "Invoice",
//!  "body": "Can you send the invoice?", "received_at": "2026-01-07T10:00:00Z"}
//! ```
//!
//! The watcher reports each message ID once while its spool file exists.
//! Per-kind filters:
//!
//! - mailbox: messages flagged `"read": true` are skipped
//! - messaging: only messages mentioning a configured keyword are reported

use super::{load_cursor, save_cursor, Watcher, WatcherKind};
use crate::error::Result;
use crate::io;
use crate::item::ActionItem;
use crate::layout::sanitize_name;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenCursor {
    /// Spool file name to the message key it carried: the message ID, or
    /// the file name itself for messages without one. Entries go away with
    /// their spool file.
    #[serde(default)]
    reported: BTreeMap<String, String>,
}

pub struct ChannelWatcher {
    id: String,
    kind: WatcherKind,
    spool_dir: PathBuf,
    cursor_path: PathBuf,
    keywords: Vec<String>,
    cursor: SeenCursor,
}

impl ChannelWatcher {
    pub fn open(
        id: &str,
        kind: WatcherKind,
        spool_dir: PathBuf,
        cursor_path: PathBuf,
        keywords: Vec<String>,
    ) -> Result<Self> {
        let cursor = load_cursor(&cursor_path)?;
        Ok(Self {
            id: id.to_string(),
            kind,
            spool_dir,
            cursor_path,
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            cursor,
        })
    }

    fn wanted(&self, message: &ChannelMessage) -> bool {
        match self.kind {
            WatcherKind::Mailbox => !message.read,
            WatcherKind::Messaging => {
                let text = format!(
                    "{}\n{}",
                    message.subject.as_deref().unwrap_or_default(),
                    message.body
                )
                .to_lowercase();
                self.keywords.iter().any(|k| text.contains(k.as_str()))
            }
            _ => true,
        }
    }

    fn to_item(&self, message: ChannelMessage) -> ActionItem {
        let suffix = match &message.id {
            Some(id) => sanitize_name(id),
            None => uuid::Uuid::new_v4().simple().to_string(),
        };
        let mut item = ActionItem::new(
            format!("{}{suffix}.md", self.kind.item_prefix()),
            self.kind.as_str(),
            message.body,
        );
        item.subject = message.subject;
        item.sender = message.from;
        item.external_id = message.id;
        if let Some(at) = message.received_at {
            item.created_at = at;
        }
        item
    }
}

#[async_trait]
impl Watcher for ChannelWatcher {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> WatcherKind {
        self.kind
    }

    async fn check_for_updates(&mut self) -> Result<Vec<ActionItem>> {
        let files = io::list_matching(&self.spool_dir, |n| n.ends_with(".json") && !n.starts_with('.'))?;
        let present: BTreeSet<&str> = files.iter().map(String::as_str).collect();
        self.cursor.reported.retain(|file, _| present.contains(file.as_str()));
        let mut known: BTreeSet<String> = self.cursor.reported.values().cloned().collect();

        let mut items = Vec::new();
        for file in &files {
            if self.cursor.reported.contains_key(file) {
                continue;
            }
            let path = self.spool_dir.join(file);
            let message: ChannelMessage = match std::fs::read_to_string(&path)
                .map_err(crate::error::AideError::from)
                .and_then(|data| Ok(serde_json::from_str(&data)?))
            {
                Ok(m) => m,
                Err(e) => {
                    warn!(watcher = %self.id, file = %file, error = %e, "skipping unparseable spool message");
                    continue;
                }
            };

            let key = message.id.clone().unwrap_or_else(|| file.clone());
            self.cursor.reported.insert(file.clone(), key.clone());
            if !known.insert(key) {
                debug!(watcher = %self.id, file = %file, "message already reported");
                continue;
            }
            if !self.wanted(&message) {
                debug!(watcher = %self.id, file = %file, "message filtered out");
                continue;
            }
            items.push(self.to_item(message));
        }
        Ok(items)
    }

    fn commit_cursor(&mut self) -> Result<()> {
        save_cursor(&self.cursor_path, &self.cursor)
    }
}
