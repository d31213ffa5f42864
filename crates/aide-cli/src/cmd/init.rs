use super::GlobalOpts;
use crate::output::print_json;
use aide_core::config::Config;
use aide_core::dashboard::DashboardUpdater;
use aide_core::layout::{VaultLayout, CONFIG_FILE, STAGES};
use anyhow::Context;
use std::path::Path;

pub fn run(vault: &Path, opts: GlobalOpts) -> anyhow::Result<()> {
    let layout = VaultLayout::new(vault);
    layout
        .ensure()
        .with_context(|| format!("failed to create vault at {}", vault.display()))?;

    let created_config = !layout.config_path().exists();
    if created_config {
        Config::new(vault)
            .save()
            .with_context(|| format!("failed to write {CONFIG_FILE}"))?;
    }
    DashboardUpdater::new(layout.clone())
        .update()
        .context("failed to write dashboard")?;

    if opts.json {
        #[derive(serde::Serialize)]
        struct InitOutput<'a> {
            vault: String,
            stages: &'a [&'a str],
            created_config: bool,
        }
        return print_json(&InitOutput {
            vault: vault.display().to_string(),
            stages: &STAGES,
            created_config,
        });
    }

    println!("Vault ready at: {}", vault.display());
    if created_config {
        println!("  created: {CONFIG_FILE}");
    } else {
        println!("  exists:  {CONFIG_FILE}");
    }
    Ok(())
}
