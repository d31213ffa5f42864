use super::GlobalOpts;
use crate::output::{emit, snapshot_text};
use aide_core::dashboard::DashboardSnapshot;
use aide_core::layout::VaultLayout;
use anyhow::Context;
use chrono::Utc;
use std::path::Path;

pub fn run(vault: &Path, opts: GlobalOpts) -> anyhow::Result<()> {
    let layout = VaultLayout::new(vault);
    layout.require()?;
    let snapshot =
        DashboardSnapshot::collect(&layout, Utc::now()).context("failed to read vault state")?;

    if !opts.json {
        println!("Vault: {}\n", vault.display());
    }
    emit(opts.json, &snapshot, snapshot_text)
}
