//! Claim-by-rename: exclusive ownership of a vault entry.
//!
//! A process takes an entry `X` by renaming it to `X.processing` in the same
//! directory. `rename(2)` is atomic within one volume, so when several
//! processes race for `X` exactly one rename succeeds and the others get
//! `NotFound`, which they treat as "already handled". The vault must not span
//! filesystems.
//!
//! A claimant that crashes leaves `X.processing` behind. [`recover_stale`]
//! renames such entries back once they are older than a grace period; the
//! claim refreshes the entry's mtime so the grace period counts from the
//! claim, not from file creation.

use crate::error::Result;
use crate::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

pub const CLAIM_SUFFIX: &str = ".processing";

/// An entry owned by this process until it is completed or released.
#[derive(Debug)]
pub struct Claim {
    dir: PathBuf,
    name: String,
    claimed: PathBuf,
}

impl Claim {
    /// Try to claim `dir/name`. Returns `Ok(None)` when another process got
    /// there first (or the entry disappeared).
    pub fn acquire(dir: &Path, name: &str) -> Result<Option<Claim>> {
        let original = dir.join(name);
        let claimed = dir.join(format!("{name}{CLAIM_SUFFIX}"));
        match std::fs::rename(&original, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(entry = name, "claim lost: entry already taken");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        touch(&claimed);
        Ok(Some(Claim {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            claimed,
        }))
    }

    /// The entry's name before it was claimed.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current on-disk location of the claimed entry.
    pub fn path(&self) -> &Path {
        &self.claimed
    }

    /// Finish the claim by moving the entry into `dest_dir` under its
    /// original name (suffixed if taken). Returns the final path.
    pub fn complete_into(self, dest_dir: &Path) -> Result<PathBuf> {
        io::move_into(&self.claimed, dest_dir, &self.name)
    }

    /// Give the entry back to its queue under its original name.
    pub fn release(self) -> Result<PathBuf> {
        io::move_into(&self.claimed, &self.dir, &self.name)
    }
}

fn touch(path: &Path) {
    let result = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(SystemTime::now()));
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "could not refresh claim mtime");
    }
}

/// Names of claimed entries in `dir` (without the claim suffix).
pub fn list_claimed(dir: &Path) -> Result<Vec<String>> {
    Ok(io::list_matching(dir, |n| n.ends_with(CLAIM_SUFFIX) && !n.starts_with('.'))?
        .into_iter()
        .map(|n| n.trim_end_matches(CLAIM_SUFFIX).to_string())
        .collect())
}

/// Return orphaned claims older than `grace` to their queue. Returns the
/// original names that were recovered.
pub fn recover_stale(dir: &Path, grace: Duration, now: SystemTime) -> Result<Vec<String>> {
    let mut recovered = Vec::new();
    for name in list_claimed(dir)? {
        let claimed = dir.join(format!("{name}{CLAIM_SUFFIX}"));
        let modified = match std::fs::metadata(&claimed).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => continue,
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age < grace {
            continue;
        }
        match io::move_into(&claimed, dir, &name) {
            Ok(_) => {
                warn!(entry = %name, age_secs = age.as_secs(), "recovered orphaned claim");
                recovered.push(name);
            }
            Err(e) => warn!(entry = %name, error = %e, "failed to recover orphaned claim"),
        }
    }
    Ok(recovered)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
