use crate::error::{AideError, Result};
use crate::io;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const NEEDS_ACTION_DIR: &str = "Needs_Action";
pub const PLANS_DIR: &str = "Plans";
pub const APPROVED_DIR: &str = "Approved";
pub const DONE_DIR: &str = "Done";
pub const EXPIRED_DIR: &str = "Expired";
pub const FAILED_DIR: &str = "Failed";
pub const LOGS_DIR: &str = "Logs";
pub const INBOX_DIR: &str = "Inbox";
pub const ACCOUNTING_DIRS: [&str; 3] = [
    "Accounting/Transactions",
    "Accounting/Summaries",
    "Accounting/Audits",
];

pub const STATE_DIR: &str = ".state";
pub const WATCHERS_STATE_DIR: &str = ".state/watchers";
pub const CURSORS_STATE_DIR: &str = ".state/cursors";
pub const SPOOL_DIR: &str = ".spool";
pub const ATTEMPTS_DIR: &str = ".attempts";

pub const CONFIG_FILE: &str = "aide.yaml";
pub const DASHBOARD_FILE: &str = "Dashboard.md";

/// Stage folders in pipeline order, as shown on the dashboard.
pub const STAGES: [&str; 6] = [
    NEEDS_ACTION_DIR,
    PLANS_DIR,
    APPROVED_DIR,
    DONE_DIR,
    EXPIRED_DIR,
    FAILED_DIR,
];

// ---------------------------------------------------------------------------
// VaultLayout
// ---------------------------------------------------------------------------

/// The canonical directory structure rooted at a vault path.
///
/// Holds no state besides the root; every component receives one through its
/// config instead of reading paths from globals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultLayout {
    root: PathBuf,
}

impl VaultLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn needs_action(&self) -> PathBuf {
        self.root.join(NEEDS_ACTION_DIR)
    }

    pub fn plans(&self) -> PathBuf {
        self.root.join(PLANS_DIR)
    }

    pub fn approved(&self) -> PathBuf {
        self.root.join(APPROVED_DIR)
    }

    pub fn done(&self) -> PathBuf {
        self.root.join(DONE_DIR)
    }

    pub fn expired(&self) -> PathBuf {
        self.root.join(EXPIRED_DIR)
    }

    pub fn failed(&self) -> PathBuf {
        self.root.join(FAILED_DIR)
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn inbox(&self) -> PathBuf {
        self.root.join(INBOX_DIR)
    }

    pub fn stage(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn attempts_dir(&self) -> PathBuf {
        self.needs_action().join(ATTEMPTS_DIR)
    }

    pub fn watchers_state(&self) -> PathBuf {
        self.root.join(WATCHERS_STATE_DIR)
    }

    pub fn watcher_record_path(&self, watcher_id: &str) -> PathBuf {
        self.watchers_state()
            .join(format!("{}.yaml", sanitize_name(watcher_id)))
    }

    pub fn cursor_path(&self, watcher_id: &str) -> PathBuf {
        self.root
            .join(CURSORS_STATE_DIR)
            .join(format!("{}.yaml", sanitize_name(watcher_id)))
    }

    pub fn spool(&self, channel: &str) -> PathBuf {
        self.root.join(SPOOL_DIR).join(channel)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn dashboard_path(&self) -> PathBuf {
        self.root.join(DASHBOARD_FILE)
    }

    fn all_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = STAGES.iter().map(|s| self.root.join(s)).collect();
        dirs.push(self.logs());
        dirs.push(self.inbox());
        dirs.extend(ACCOUNTING_DIRS.iter().map(|d| self.root.join(d)));
        dirs.push(self.watchers_state());
        dirs.push(self.root.join(CURSORS_STATE_DIR));
        dirs.push(self.attempts_dir());
        dirs
    }

    /// Create every canonical directory. Calling it again is a no-op.
    pub fn ensure(&self) -> Result<()> {
        for dir in self.all_dirs() {
            io::ensure_dir(&dir)?;
        }
        Ok(())
    }

    /// Fail unless the stage folders exist.
    pub fn require(&self) -> Result<()> {
        if STAGES.iter().all(|s| self.root.join(s).is_dir()) {
            Ok(())
        } else {
            Err(AideError::NotInitialized(self.root.display().to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Name sanitizing
// ---------------------------------------------------------------------------

static UNSAFE_RE: OnceLock<Regex> = OnceLock::new();

fn unsafe_re() -> &'static Regex {
    UNSAFE_RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap())
}

/// Reduce arbitrary text (message IDs, subjects, watcher names) to a string
/// usable as a single path component.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned = unsafe_re().replace_all(raw.trim(), "_");
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');
    let mut out: String = cleaned.chars().take(80).collect();
    if out.is_empty() {
        out.push_str("unnamed");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
