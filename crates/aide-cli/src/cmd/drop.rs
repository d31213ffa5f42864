use super::GlobalOpts;
use crate::output::print_json;
use aide_core::audit::AuditLog;
use aide_core::item::ActionItem;
use aide_core::layout::{sanitize_name, VaultLayout};
use anyhow::{bail, Context};
use std::path::Path;

pub fn run(vault: &Path, file: &Path, source: &str, opts: GlobalOpts) -> anyhow::Result<()> {
    let layout = VaultLayout::new(vault);
    layout.require()?;

    let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let Ok(body) = String::from_utf8(bytes) else {
        bail!(
            "{} is not a text file; put binary files into {} for the filesystem watcher",
            file.display(),
            layout.inbox().display()
        );
    };
    let original = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let item = ActionItem::new(sanitize_name(&original), source, body).with_subject(original);
    let path = item.deposit(&layout.needs_action())?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    AuditLog::new(layout, "operator").record("item_created", &name, source);

    if opts.json {
        return print_json(&serde_json::json!({ "item": name, "path": path }));
    }
    println!("queued: {name}");
    Ok(())
}
