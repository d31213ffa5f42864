//! Terminal rendering: `--json` documents, or aligned text for people.

use aide_core::approval::OrchestratorReport;
use aide_core::dashboard::DashboardSnapshot;
use aide_core::processor::ProcessReport;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// Print `value` as JSON under `--json`, otherwise as rendered by `text`.
pub fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
    if json {
        return print_json(value);
    }
    print!("{}", text(value));
    Ok(())
}

fn counts(fields: &[(&str, usize)]) -> String {
    let line: Vec<String> = fields.iter().map(|(k, v)| format!("{k}: {v}")).collect();
    format!("{}\n", line.join("  "))
}

pub fn process_summary(report: &ProcessReport) -> String {
    counts(&[
        ("processed", report.processed),
        ("failed", report.failed),
        ("quarantined", report.quarantined),
        ("recovered", report.recovered),
        ("skipped", report.skipped),
    ])
}

pub fn orchestrator_summary(report: &OrchestratorReport) -> String {
    counts(&[
        ("executed", report.executed),
        ("failed", report.failed),
        ("expired", report.expired),
        ("expired pending", report.expired_pending),
        ("malformed", report.malformed),
        ("recovered", report.recovered),
    ])
}

/// Columns padded to the widest cell, two spaces apart.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let line = |cells: Vec<String>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:w$}"))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut out = line(headers.iter().map(|h| h.to_string()).collect());
    out.push_str(&line(widths.iter().map(|&w| "-".repeat(w)).collect()));
    for row in rows {
        out.push_str(&line(row.clone()));
    }
    out
}

/// `aide status` without `--json`.
pub fn snapshot_text(snapshot: &DashboardSnapshot) -> String {
    let stages: Vec<Vec<String>> = snapshot
        .stages
        .iter()
        .map(|s| vec![s.stage.clone(), s.queued.to_string(), s.claimed.to_string()])
        .collect();
    let mut out = render_table(&["STAGE", "WAITING", "IN PROGRESS"], &stages);

    if let Some(p) = &snapshot.oldest_pending_approval {
        out.push_str(&format!(
            "\nOldest plan awaiting approval: {} (generated {})\n",
            p.plan,
            p.generated_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    if snapshot.expired_last_24h > 0 {
        out.push_str(&format!("Expired in the last 24h: {}\n", snapshot.expired_last_24h));
    }

    if snapshot.watchers.is_empty() {
        out.push_str("\nNo watchers have run yet.\n");
        return out;
    }
    let watchers: Vec<Vec<String>> = snapshot
        .watchers
        .iter()
        .map(|w| {
            let r = &w.record;
            vec![
                r.id.clone(),
                r.kind.to_string(),
                if w.stale {
                    format!("{} (stale)", r.status)
                } else {
                    r.status.to_string()
                },
                r.last_poll_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
                r.consecutive_failures.to_string(),
                r.restart_count.to_string(),
                r.items_emitted.to_string(),
            ]
        })
        .collect();
    out.push('\n');
    out.push_str(&render_table(
        &["WATCHER", "KIND", "STATUS", "LAST POLL", "FAILURES", "RESTARTS", "ITEMS"],
        &watchers,
    ));
    out
}
