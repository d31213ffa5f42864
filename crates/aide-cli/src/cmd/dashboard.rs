use super::{runtime, GlobalOpts};
use aide_core::dashboard::DashboardUpdater;
use aide_core::layout::VaultLayout;
use aide_core::runtime::{run_loop, shutdown_token};
use std::path::Path;
use std::time::Duration;

pub fn run(vault: &Path, watch: bool, interval: u64, opts: GlobalOpts) -> anyhow::Result<()> {
    let layout = VaultLayout::new(vault);
    layout.require()?;
    let mut updater = DashboardUpdater::new(layout);

    if !watch {
        let path = updater.update()?;
        if opts.json {
            return crate::output::print_json(&serde_json::json!({ "dashboard": path }));
        }
        println!("Dashboard written to {}", path.display());
        return Ok(());
    }

    runtime()?.block_on(async {
        let stop = shutdown_token();
        run_loop(&mut updater, Duration::from_secs(interval), &stop).await?;
        Ok::<_, anyhow::Error>(())
    })
}
