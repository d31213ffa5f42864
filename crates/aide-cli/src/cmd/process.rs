use super::{load_config, runtime, GlobalOpts};
use crate::output::{emit, process_summary};
use aide_core::generator::GenerationMethod;
use aide_core::processor::ActionProcessor;
use aide_core::runtime::{run_loop, shutdown_token};
use std::path::Path;
use std::time::Duration;

pub fn run(
    vault: &Path,
    interval: Option<u64>,
    method: Option<&str>,
    once: bool,
    opts: GlobalOpts,
) -> anyhow::Result<()> {
    let mut config = load_config(vault, opts)?;
    if let Some(secs) = interval {
        config.processor.interval_secs = secs;
    }
    if let Some(method) = method {
        config.processor.method = method.parse::<GenerationMethod>()?;
    }
    let interval = Duration::from_secs(config.processor.interval_secs);
    let mut processor = ActionProcessor::from_config(config);

    runtime()?.block_on(async {
        let stop = shutdown_token();
        if once {
            let report = processor.poll_once(&stop).await?;
            return emit(opts.json, &report, process_summary);
        }
        run_loop(&mut processor, interval, &stop).await?;
        Ok::<_, anyhow::Error>(())
    })
}
