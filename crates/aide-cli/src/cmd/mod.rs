pub mod dashboard;
pub mod drop;
pub mod init;
pub mod orchestrate;
pub mod process;
pub mod review;
pub mod status;
pub mod watch;

use aide_core::config::{Config, WarnLevel};
use anyhow::Context;
use std::path::Path;

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Copy)]
pub struct GlobalOpts {
    pub dry_run: bool,
    pub json: bool,
}

/// Load the vault's config for a component, failing if the vault was never
/// initialized. CLI flags override the file.
pub fn load_config(vault: &Path, opts: GlobalOpts) -> anyhow::Result<Config> {
    let layout = aide_core::layout::VaultLayout::new(vault);
    layout.require()?;
    let mut config = Config::load(vault)
        .with_context(|| format!("failed to load {}", layout.config_path().display()))?;
    if opts.dry_run {
        config.dry_run = true;
    }
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Error => tracing::error!("{}", warning.message),
            WarnLevel::Warning => tracing::warn!("{}", warning.message),
        }
    }
    Ok(config)
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}
