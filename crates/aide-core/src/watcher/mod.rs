//! Channel watchers.
//!
//! A watcher turns events on one channel into action items. The core only
//! relies on [`Watcher::check_for_updates`]: "new items since the last
//! check". [`WatcherRunner`] wraps a watcher in the supervised loop: poll,
//! deposit into `Needs_Action`, persist the cursor, update the supervision
//! record.
//!
//! Cursors are committed only after every item of a poll is deposited. A
//! crash between the two re-reports those items on restart rather than
//! losing them.

pub mod channel;
pub mod filesystem;
pub mod instance;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::error::{AideError, Result};
use crate::io;
use crate::item::ActionItem;
use crate::layout::VaultLayout;
use crate::runtime::{self, Component};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use channel::{ChannelMessage, ChannelWatcher};
pub use filesystem::FilesystemWatcher;
pub use instance::{WatcherInstance, WatcherStatus};

// ---------------------------------------------------------------------------
// WatcherKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherKind {
    Filesystem,
    Mailbox,
    Messaging,
    Network,
}

impl WatcherKind {
    pub const ALL: [WatcherKind; 4] = [
        WatcherKind::Filesystem,
        WatcherKind::Mailbox,
        WatcherKind::Messaging,
        WatcherKind::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherKind::Filesystem => "filesystem",
            WatcherKind::Mailbox => "mailbox",
            WatcherKind::Messaging => "messaging",
            WatcherKind::Network => "network",
        }
    }

    /// Prefix of the action item names this kind emits.
    pub fn item_prefix(&self) -> &'static str {
        match self {
            WatcherKind::Filesystem => "FILE_",
            WatcherKind::Mailbox => "EMAIL_",
            WatcherKind::Messaging => "MESSAGE_",
            WatcherKind::Network => "NETWORK_",
        }
    }
}

impl fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WatcherKind {
    type Err = AideError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "filesystem" | "fs" => Ok(WatcherKind::Filesystem),
            "mailbox" | "email" | "gmail" => Ok(WatcherKind::Mailbox),
            "messaging" | "whatsapp" => Ok(WatcherKind::Messaging),
            "network" | "linkedin" => Ok(WatcherKind::Network),
            other => Err(AideError::UnknownVariant {
                what: "watcher kind",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Watcher trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Watcher: Send {
    fn id(&self) -> &str;

    fn kind(&self) -> WatcherKind;

    /// Items that appeared since the last call. Must not report an item
    /// twice within one process; across restarts that holds only for items
    /// whose cursor was committed.
    async fn check_for_updates(&mut self) -> Result<Vec<ActionItem>>;

    /// Persist the cursor after the last batch was deposited.
    fn commit_cursor(&mut self) -> Result<()>;
}

/// Build the watcher for `kind`, loading its persisted cursor.
pub fn from_config(kind: WatcherKind, id: &str, config: &Config) -> Result<Box<dyn Watcher>> {
    let layout = config.layout();
    Ok(match kind {
        WatcherKind::Filesystem => Box::new(FilesystemWatcher::open(
            id,
            config.drop_dir(),
            layout.cursor_path(id),
        )?),
        _ => Box::new(ChannelWatcher::open(
            id,
            kind,
            layout.spool(kind.as_str()),
            layout.cursor_path(id),
            config.watchers.messaging_keywords.clone(),
        )?),
    })
}

// ---------------------------------------------------------------------------
// Cursor persistence
// ---------------------------------------------------------------------------

/// Load a YAML cursor. A missing file is a fresh cursor; one that does not
/// parse is fatal, since guessing would re-report or drop items.
pub(crate) fn load_cursor<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match std::fs::read_to_string(path) {
        Ok(data) if data.trim().is_empty() => Ok(T::default()),
        Ok(data) => serde_yaml::from_str(&data).map_err(|e| {
            AideError::Fatal(format!("corrupted cursor {}: {e}", path.display()))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn save_cursor<T: Serialize>(path: &Path, cursor: &T) -> Result<()> {
    let data = serde_yaml::to_string(cursor)?;
    io::atomic_write(path, data.as_bytes())
}

// ---------------------------------------------------------------------------
// WatcherRunner
// ---------------------------------------------------------------------------

fn register(layout: &VaultLayout, id: &str, kind: WatcherKind) -> Result<WatcherInstance> {
    let record = WatcherInstance::record_start(layout, id, kind)?;
    if record.restart_count > 0 {
        warn!(
            watcher = %record.id,
            restart_count = record.restart_count,
            "watcher restarted after an unclean exit"
        );
    }
    Ok(record)
}

/// The supervised loop around one watcher.
pub struct WatcherRunner {
    watcher: Box<dyn Watcher>,
    layout: VaultLayout,
    record: WatcherInstance,
    audit: AuditLog,
}

impl WatcherRunner {
    /// Register this process as the watcher's current incarnation, then
    /// build the watcher from `config`. The start is recorded before the
    /// cursor is read, so a watcher that cannot even open still shows up in
    /// the restart count with its error.
    pub fn open(kind: WatcherKind, id: &str, config: &Config) -> Result<Self> {
        let layout = config.layout();
        let mut record = register(&layout, id, kind)?;
        match from_config(kind, id, config) {
            Ok(watcher) => Self::attach(watcher, layout, record),
            Err(e) => {
                error!(watcher = %id, error = %e, "watcher failed to open");
                record.record_crash(&e.to_string());
                Err(e)
            }
        }
    }

    /// Register an already-built watcher.
    pub fn start(watcher: Box<dyn Watcher>, layout: VaultLayout) -> Result<Self> {
        let record = register(&layout, watcher.id(), watcher.kind())?;
        Self::attach(watcher, layout, record)
    }

    fn attach(
        watcher: Box<dyn Watcher>,
        layout: VaultLayout,
        mut record: WatcherInstance,
    ) -> Result<Self> {
        record.record_running()?;
        Ok(Self {
            audit: AuditLog::new(layout.clone(), format!("watcher:{}", watcher.id())),
            watcher,
            layout,
            record,
        })
    }

    pub fn record(&self) -> &WatcherInstance {
        &self.record
    }

    /// One check-deposit-commit cycle. Transient channel errors are
    /// recorded and swallowed; anything else is recorded as a crash and
    /// returned.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let items = match self.watcher.check_for_updates().await {
            Ok(items) => items,
            Err(e) if e.is_transient() => {
                warn!(watcher = %self.record.id, error = %e, "transient channel error, retrying next cycle");
                self.record.record_failure(&e.to_string())?;
                return Ok(0);
            }
            Err(e) => return Err(self.crash(e)),
        };

        let queue = self.layout.needs_action();
        for item in &items {
            match item.deposit(&queue) {
                Ok(path) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    info!(watcher = %self.record.id, item = %name, "action item created");
                    self.audit.record("item_created", &name, item.source.clone());
                }
                Err(e) => return Err(self.crash(e)),
            }
        }
        if let Err(e) = self.watcher.commit_cursor() {
            return Err(self.crash(e));
        }
        self.record.record_success(items.len(), Utc::now())?;
        Ok(items.len())
    }

    fn crash(&mut self, e: AideError) -> AideError {
        error!(watcher = %self.record.id, error = %e, "unrecoverable watcher error");
        self.record.record_crash(&e.to_string());
        e
    }

    /// Run until `stop` is cancelled or a fatal error occurs.
    pub async fn run(&mut self, interval: Duration, stop: &CancellationToken) -> Result<()> {
        runtime::run_loop(self, interval, stop).await
    }
}

#[async_trait]
impl Component for WatcherRunner {
    fn name(&self) -> &str {
        &self.record.id
    }

    async fn tick(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.poll_once().await.map(|_| ())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.record.record_stop()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
