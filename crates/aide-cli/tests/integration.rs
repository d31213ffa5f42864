#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn aide(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("aide").unwrap();
    cmd.current_dir(dir.path())
        .env("AIDE_VAULT", dir.path())
        .env_remove("AIDE_DRY_RUN")
        .env_remove("RUST_LOG");
    cmd
}

fn init_vault(dir: &TempDir) {
    aide(dir).arg("init").assert().success();
}

fn names_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// Drop `task_invoice.txt` and run one simulated processing cycle.
fn process_invoice(dir: &TempDir) -> String {
    let task = dir.path().join("task_invoice.txt");
    std::fs::write(&task, "create an invoice for Client A").unwrap();
    aide(dir).arg("drop").arg(&task).assert().success();
    aide(dir)
        .args(["process", "--once", "--method", "simulate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("processed: 1"));
    let plans = names_in(&dir.path().join("Plans"));
    assert_eq!(plans.len(), 1);
    plans[0].clone()
}

// ---------------------------------------------------------------------------
// aide init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_vault_layout() {
    let dir = TempDir::new().unwrap();
    aide(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: aide.yaml"));

    for stage in ["Needs_Action", "Plans", "Approved", "Done", "Expired", "Failed", "Logs"] {
        assert!(dir.path().join(stage).is_dir(), "{stage} missing");
    }
    assert!(dir.path().join("Accounting/Transactions").is_dir());
    assert!(dir.path().join("aide.yaml").exists());
    assert!(dir.path().join("Dashboard.md").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    aide(&dir).arg("init").assert().success();
    std::fs::write(dir.path().join("aide.yaml"), "processor:\n  max_attempts: 7\n").unwrap();
    aide(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  aide.yaml"));

    let config = std::fs::read_to_string(dir.path().join("aide.yaml")).unwrap();
    assert!(config.contains("max_attempts: 7"));
}

#[test]
fn components_refuse_uninitialized_vault() {
    let dir = TempDir::new().unwrap();
    aide(&dir)
        .args(["process", "--once"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[test]
fn invoice_scenario_produces_plan_and_archives_item() {
    let dir = TempDir::new().unwrap();
    init_vault(&dir);
    let plan = process_invoice(&dir);

    assert!(dir.path().join("Done/task_invoice.txt").exists());
    assert!(names_in(&dir.path().join("Needs_Action")).is_empty());

    let text = std::fs::read_to_string(dir.path().join("Plans").join(&plan)).unwrap();
    assert!(text.contains("source_item: task_invoice.txt"));
    assert!(text.contains("Client A"));
    assert!(text.contains("domain: accounting"));
}

#[test]
fn approve_then_orchestrate_executes_plan() {
    let dir = TempDir::new().unwrap();
    init_vault(&dir);
    let plan = process_invoice(&dir);

    aide(&dir)
        .args(["approve", &plan])
        .assert()
        .success()
        .stdout(predicate::str::contains("approved"));
    let approved = std::fs::read_to_string(dir.path().join("Approved").join(&plan)).unwrap();
    assert!(approved.contains("approved_at:"));

    aide(&dir)
        .args(["orchestrate", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("executed: 1"));

    let done = std::fs::read_to_string(dir.path().join("Done").join(&plan)).unwrap();
    assert!(done.contains("## Execution log"));
    assert!(done.contains("- outcome: success"));
    assert!(names_in(&dir.path().join("Approved")).is_empty());
}

#[test]
fn dry_run_env_skips_execution() {
    let dir = TempDir::new().unwrap();
    init_vault(&dir);
    let plan = process_invoice(&dir);
    aide(&dir).args(["approve", &plan]).assert().success();

    aide(&dir)
        .env("AIDE_DRY_RUN", "true")
        .args(["orchestrate", "--once"])
        .assert()
        .success();

    let done = std::fs::read_to_string(dir.path().join("Done").join(&plan)).unwrap();
    assert!(done.contains("- outcome: dry_run"));
}

#[test]
fn reject_archives_plan_as_rejected() {
    let dir = TempDir::new().unwrap();
    init_vault(&dir);
    let plan = process_invoice(&dir);

    aide(&dir)
        .args(["reject", &plan, "--reason", "client already paid"])
        .assert()
        .success();
    let done = std::fs::read_to_string(dir.path().join("Done").join(&plan)).unwrap();
    assert!(done.contains("- outcome: rejected"));
    assert!(done.contains("client already paid"));
}

#[test]
fn approve_unknown_plan_fails() {
    let dir = TempDir::new().unwrap();
    init_vault(&dir);
    aide(&dir)
        .args(["approve", "PLAN_nope.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("plan not found"));
}

#[test]
fn repeated_processing_makes_no_duplicate_plans() {
    let dir = TempDir::new().unwrap();
    init_vault(&dir);
    process_invoice(&dir);
    aide(&dir)
        .args(["process", "--once", "--method", "simulate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("processed: 0"));
    assert_eq!(names_in(&dir.path().join("Plans")).len(), 1);
}

// ---------------------------------------------------------------------------
// aide status / dashboard
// ---------------------------------------------------------------------------

#[test]
fn status_json_reports_queue_depths() {
    let dir = TempDir::new().unwrap();
    init_vault(&dir);
    std::fs::write(dir.path().join("Needs_Action/a.md"), "reply to the email").unwrap();
    std::fs::write(dir.path().join("Needs_Action/b.md"), "post an update").unwrap();

    let output = aide(&dir).args(["--json", "status"]).output().unwrap();
    assert!(output.status.success());
    let snapshot: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let needs = snapshot["stages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["stage"] == "Needs_Action")
        .unwrap();
    assert_eq!(needs["queued"], 2);
    assert_eq!(needs["claimed"], 0);
}

#[test]
fn dashboard_renders_markdown() {
    let dir = TempDir::new().unwrap();
    init_vault(&dir);
    std::fs::write(dir.path().join("Needs_Action/a.md"), "x").unwrap();
    aide(&dir).arg("dashboard").assert().success();

    let md = std::fs::read_to_string(dir.path().join("Dashboard.md")).unwrap();
    assert!(md.contains("| Needs_Action | 1 | 0 |"));
}

#[test]
fn watcher_with_corrupt_cursor_is_counted_as_restarting() {
    let dir = TempDir::new().unwrap();
    init_vault(&dir);
    std::fs::write(
        dir.path().join(".state/cursors/filesystem.yaml"),
        "fingerprints: [unclosed",
    )
    .unwrap();

    for _ in 0..3 {
        aide(&dir)
            .args(["watch", "filesystem"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("corrupted cursor"));
    }

    let output = aide(&dir).args(["--json", "status"]).output().unwrap();
    let snapshot: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let watcher = &snapshot["watchers"][0];
    assert_eq!(watcher["id"], "filesystem");
    assert_eq!(watcher["status"], "crashed");
    assert_eq!(watcher["restart_count"], 2);
    assert!(watcher["last_error"]
        .as_str()
        .unwrap()
        .contains("corrupted cursor"));
}

#[test]
fn unknown_watcher_kind_fails() {
    let dir = TempDir::new().unwrap();
    init_vault(&dir);
    aide(&dir)
        .args(["watch", "fax"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown watcher kind 'fax'"));
}
