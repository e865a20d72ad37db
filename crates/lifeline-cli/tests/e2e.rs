//! E2E tests for `ll synth`, `ll tree`, `ll nodes` and `ll check`.

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ll_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ll"));
    cmd.current_dir(dir);
    cmd.env("LIFELINE_LOG", "error");
    cmd.env_remove("LIFELINE_FORMAT");
    cmd
}

fn synth(dir: &Path, count: usize) -> PathBuf {
    let path = dir.join("events.json");
    ll_cmd(dir)
        .args(["synth", "--count", &count.to_string(), "--years", "4", "--seed", "5", "-o"])
        .arg(&path)
        .assert()
        .success();
    path
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command should not crash");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn synth_writes_a_parseable_snapshot() {
    let dir = TempDir::new().expect("tempdir");
    let path = synth(dir.path(), 250);
    let events: Value = serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("json");
    let events = events.as_array().expect("array");
    assert_eq!(events.len(), 250);
    assert!(events.iter().all(|e| e["id"].is_string() && e["instant"].is_string()));
}

#[test]
fn synth_to_stdout_is_deterministic() {
    let dir = TempDir::new().expect("tempdir");
    let run = || {
        ll_cmd(dir.path())
            .args(["synth", "--count", "40", "--seed", "9"])
            .output()
            .expect("run")
            .stdout
    };
    assert_eq!(run(), run());
}

#[test]
fn tree_json_reports_every_tier() {
    let dir = TempDir::new().expect("tempdir");
    let path = synth(dir.path(), 400);
    let report = json_output(
        ll_cmd(dir.path())
            .args(["tree", "--json", "--tier", "month", "--top", "3", "--events"])
            .arg(&path),
    );

    assert_eq!(report["events"], 400);
    let tiers = report["tiers"].as_array().expect("tiers");
    let names: Vec<&str> = tiers.iter().filter_map(|t| t["tier"].as_str()).collect();
    assert_eq!(names, ["year", "month", "week", "day", "focus"]);
    assert_eq!(tiers[4]["clusters"], 400);
    assert!(report["largest"].as_array().is_some_and(|l| l.len() <= 3));
}

#[test]
fn nodes_json_lists_render_nodes() {
    let dir = TempDir::new().expect("tempdir");
    let path = synth(dir.path(), 300);
    let report = json_output(
        ll_cmd(dir.path())
            .args(["nodes", "--json", "--zoom", "0.3", "--width", "1600", "--events"])
            .arg(&path),
    );

    assert_eq!(report["tier"], "month");
    let nodes = report["nodes"].as_array().expect("nodes");
    assert!(!nodes.is_empty());
    assert!(nodes.iter().all(|n| n["node"] == "event" || n["node"] == "cluster"));
    let instants: Vec<chrono::DateTime<chrono::FixedOffset>> = nodes
        .iter()
        .filter_map(|n| n["display_instant"].as_str())
        .map(|s| chrono::DateTime::parse_from_rfc3339(s).expect("rfc3339"))
        .collect();
    assert_eq!(instants.len(), nodes.len());
    assert!(instants.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn check_passes_on_synthetic_data() {
    let dir = TempDir::new().expect("tempdir");
    let path = synth(dir.path(), 500);
    ll_cmd(dir.path())
        .args(["check", "--format", "text", "--events"])
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("ok"));
}

#[test]
fn strict_check_fails_on_rejected_events() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("bad.json");
    fs::write(
        &path,
        r#"[
            {"id": "a", "instant": "2020-01-01T10:00:00Z"},
            {"id": "b", "instant": "2020-13"},
            {"id": "a", "instant": "2020-01-02T10:00:00Z"}
        ]"#,
    )
    .expect("write");

    ll_cmd(dir.path())
        .args(["check", "--format", "text", "--events"])
        .arg(&path)
        .assert()
        .success();

    let output = ll_cmd(dir.path())
        .args(["check", "--json", "--strict", "--events"])
        .arg(&path)
        .output()
        .expect("run");
    assert!(!output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["ok"], false);
    assert_eq!(report["rejected"].as_array().map(Vec::len), Some(2));
}

#[test]
fn invalid_config_file_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let path = synth(dir.path(), 20);
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[zoom]\nbreakpoints = [0.8, 0.2, 0.4, 0.6]\n").expect("write");

    ll_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["tree", "--events"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(contains("Invalid configuration"));
}
