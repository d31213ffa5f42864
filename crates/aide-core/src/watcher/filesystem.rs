//! Drop-folder watcher: every new or changed file in the drop directory
//! becomes a `FILE_<name>.md` action item. The original stays where it was
//! dropped.

use super::{load_cursor, save_cursor, Watcher, WatcherKind};
use crate::error::Result;
use crate::io;
use crate::item::ActionItem;
use crate::layout::sanitize_name;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Identity of one version of a dropped file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
struct Fingerprint {
    name: String,
    /// Milliseconds since the Unix epoch.
    modified: i64,
    size: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FsCursor {
    #[serde(default)]
    seen: BTreeSet<Fingerprint>,
}

pub struct FilesystemWatcher {
    id: String,
    drop_dir: PathBuf,
    cursor_path: PathBuf,
    cursor: FsCursor,
}

impl FilesystemWatcher {
    pub fn open(id: &str, drop_dir: PathBuf, cursor_path: PathBuf) -> Result<Self> {
        let cursor = load_cursor(&cursor_path)?;
        Ok(Self {
            id: id.to_string(),
            drop_dir,
            cursor_path,
            cursor,
        })
    }
}

#[async_trait]
impl Watcher for FilesystemWatcher {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> WatcherKind {
        WatcherKind::Filesystem
    }

    async fn check_for_updates(&mut self) -> Result<Vec<ActionItem>> {
        io::ensure_dir(&self.drop_dir)?;
        let mut current = BTreeSet::new();
        let mut items = Vec::new();

        for name in io::list_matching(&self.drop_dir, |n| !n.starts_with('.'))? {
            let path = self.drop_dir.join(&name);
            let Ok(meta) = std::fs::metadata(&path) else {
                continue;
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let fingerprint = Fingerprint {
                name: name.clone(),
                modified: DateTime::<Utc>::from(modified).timestamp_millis(),
                size: meta.len(),
            };
            if self.cursor.seen.contains(&fingerprint) {
                current.insert(fingerprint);
                continue;
            }

            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    warn!(watcher = %self.id, file = %name, error = %e, "unreadable drop, skipping");
                    continue;
                }
            };
            let body = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => format!(
                    "Binary file `{name}` ({} bytes) dropped into `{}`.",
                    e.as_bytes().len(),
                    self.drop_dir.display()
                ),
            };
            let mut item = ActionItem::new(
                format!("{}{}.md", WatcherKind::Filesystem.item_prefix(), sanitize_name(&name)),
                WatcherKind::Filesystem.as_str(),
                body,
            )
            .with_subject(name.clone())
            .with_external_id(name.clone());
            item.created_at = DateTime::<Utc>::from(modified);
            debug!(watcher = %self.id, file = %name, "new drop");
            items.push(item);
            current.insert(fingerprint);
        }

        // Files removed from the drop folder are forgotten.
        self.cursor.seen = current;
        Ok(items)
    }

    fn commit_cursor(&mut self) -> Result<()> {
        save_cursor(&self.cursor_path, &self.cursor)
    }
}
