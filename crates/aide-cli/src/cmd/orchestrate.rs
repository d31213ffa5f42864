use super::{load_config, runtime, GlobalOpts};
use crate::output::{emit, orchestrator_summary};
use aide_core::approval::ApprovalOrchestrator;
use aide_core::runtime::{run_loop, shutdown_token};
use std::path::Path;
use std::time::Duration;

pub fn run(
    vault: &Path,
    interval: Option<u64>,
    expiration_hours: Option<u32>,
    once: bool,
    opts: GlobalOpts,
) -> anyhow::Result<()> {
    let mut config = load_config(vault, opts)?;
    if let Some(secs) = interval {
        config.approval.check_interval_secs = secs;
    }
    if let Some(hours) = expiration_hours {
        config.approval.expiration_hours = hours;
    }
    let interval = Duration::from_secs(config.approval.check_interval_secs);
    let mut orchestrator = ApprovalOrchestrator::from_config(config);

    runtime()?.block_on(async {
        let stop = shutdown_token();
        if once {
            let report = orchestrator.poll_once(&stop).await?;
            return emit(opts.json, &report, orchestrator_summary);
        }
        run_loop(&mut orchestrator, interval, &stop).await?;
        Ok::<_, anyhow::Error>(())
    })
}
