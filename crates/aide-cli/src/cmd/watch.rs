use super::{load_config, runtime, GlobalOpts};
use aide_core::runtime::shutdown_token;
use aide_core::watcher::{WatcherKind, WatcherRunner};
use anyhow::Context;
use std::path::Path;
use std::time::Duration;

pub fn run(
    vault: &Path,
    kind: &str,
    interval: Option<u64>,
    id: Option<&str>,
    opts: GlobalOpts,
) -> anyhow::Result<()> {
    let kind: WatcherKind = kind.parse()?;
    let mut config = load_config(vault, opts)?;
    if let Some(secs) = interval {
        config.watchers.interval_secs = secs;
    }
    let id = aide_core::layout::sanitize_name(id.unwrap_or(kind.as_str()));
    let interval = Duration::from_secs(config.watchers.interval_secs);

    runtime()?.block_on(async {
        let mut runner = WatcherRunner::open(kind, &id, &config)
            .with_context(|| format!("failed to open {kind} watcher '{id}'"))?;
        let stop = shutdown_token();
        runner.run(interval, &stop).await?;
        Ok::<_, anyhow::Error>(())
    })
}
