use super::GlobalOpts;
use crate::output::print_json;
use aide_core::approval::{approve_plan, reject_plan};
use aide_core::layout::VaultLayout;
use chrono::Utc;
use std::path::{Path, PathBuf};

#[derive(serde::Serialize)]
struct Moved<'a> {
    plan: &'a str,
    outcome: &'static str,
    path: PathBuf,
}

pub fn approve(vault: &Path, plan: &str, opts: GlobalOpts) -> anyhow::Result<()> {
    let layout = VaultLayout::new(vault);
    layout.require()?;
    let path = approve_plan(&layout, plan, Utc::now())?;
    report(plan, "approved", path, opts)
}

pub fn reject(vault: &Path, plan: &str, reason: &str, opts: GlobalOpts) -> anyhow::Result<()> {
    let layout = VaultLayout::new(vault);
    layout.require()?;
    let path = reject_plan(&layout, plan, reason, Utc::now())?;
    report(plan, "rejected", path, opts)
}

fn report(plan: &str, outcome: &'static str, path: PathBuf, opts: GlobalOpts) -> anyhow::Result<()> {
    if opts.json {
        return print_json(&Moved { plan, outcome, path });
    }
    println!("{outcome}: {plan} -> {}", path.display());
    Ok(())
}
