use crate::error::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Readers either see the previous content or the full new content, never a
/// partial write.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Append text to a file, creating it if it doesn't exist.
pub fn append_text(path: &Path, text: &str) -> Result<()> {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    f.write_all(text.as_bytes())?;
    Ok(())
}

/// Entry names considered part of a stage's queue: regular files that are
/// neither hidden (tempfiles, sidecar dirs) nor claimed.
pub fn is_queue_entry(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(crate::claim::CLAIM_SUFFIX)
}

/// List queue entries of `dir` by file name, sorted. A missing directory is
/// an empty queue. Entries that vanish mid-listing are skipped.
pub fn list_queue(dir: &Path) -> Result<Vec<String>> {
    list_matching(dir, is_queue_entry)
}

/// List file names in `dir` that satisfy `keep`, sorted.
pub fn list_matching(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut names = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let Ok(ft) = entry.file_type() else { continue };
        if !ft.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if keep(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// First free path for `name` inside `dir`: `name` itself, then
/// `stem.1.ext`, `stem.2.ext`, ...
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s, Some(e)),
        _ => (name, None),
    };
    (1u32..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem}.{n}.{ext}")),
            None => dir.join(format!("{stem}.{n}")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Move `src` into `dest_dir` under `name` without overwriting an existing
/// entry. Source and destination must be on the same volume. Returns the
/// final path.
pub fn move_into(src: &Path, dest_dir: &Path, name: &str) -> Result<PathBuf> {
    ensure_dir(dest_dir)?;
    let dest = unique_path(dest_dir, name);
    std::fs::rename(src, &dest)?;
    Ok(dest)
}

/// Append a `---`-separated Markdown section to a terminal artifact.
pub fn append_trailer(path: &Path, title: &str, fields: &[(&str, String)]) -> Result<()> {
    let mut text = format!("\n\n---\n## {title}\n");
    for (key, value) in fields {
        text.push_str(&format!("- {key}: {}\n", value.replace('\n', "\n  ")));
    }
    append_text(path, &text)
}

/// Best-effort [`append_trailer`] for artifacts of unknown content. Binary
/// payloads are left untouched; their outcome is in the audit log.
pub fn annotate(path: &Path, title: &str, fields: &[(&str, String)]) {
    let is_text = std::fs::read(path)
        .map(|bytes| std::str::from_utf8(&bytes).is_ok())
        .unwrap_or(false);
    if !is_text {
        return;
    }
    if let Err(e) = append_trailer(path, title, fields) {
        tracing::warn!(path = %path.display(), error = %e, "could not annotate artifact");
    }
}
