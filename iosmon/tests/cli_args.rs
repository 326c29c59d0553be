//! CLI tests for iosmon: help text, history persistence through --dry-run, --forget.
use std::fs;
use std::path::Path;

use assert_cmd::Command;

fn run_iosmon(config_home: &Path, args: &[&str]) -> (bool, String) {
    let output = Command::cargo_bin("iosmon")
        .expect("iosmon binary")
        .env("XDG_CONFIG_HOME", config_home)
        .args(args)
        .output()
        .expect("run iosmon");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    (output.status.success(), text)
}

fn history_file(config_home: &Path) -> std::path::PathBuf {
    config_home.join("iosmon").join("history.json")
}

#[test]
fn test_help_mentions_short_and_long_flags() {
    let td = tempfile::tempdir().unwrap();
    let (ok, text) = run_iosmon(td.path(), &["--help"]);
    assert!(ok, "--help should exit successfully");
    assert!(text.contains("Usage:"));
    for flag in [
        "--tls-ca", "-t", "--device", "-d", "--process", "-p", "--stackshot", "--dry-run",
    ] {
        assert!(text.contains(flag), "help text missing {flag}\n{text}");
    }
}

#[test]
fn test_flags_before_help_are_accepted() {
    let td = tempfile::tempdir().unwrap();
    let (ok, text) = run_iosmon(td.path(), &["-t", "/tmp/cert.pem", "-d", "abc", "--help"]);
    assert!(ok);
    assert!(text.contains("Usage:"));
    assert!(!history_file(td.path()).exists());
}

#[test]
fn test_dry_run_records_normalized_url() {
    let td = tempfile::tempdir().unwrap();
    let (ok, _) = run_iosmon(td.path(), &["--dry-run", "device-host:8766"]);
    assert!(ok);
    let data = fs::read_to_string(history_file(td.path())).expect("history.json created");
    assert!(data.contains("ws://device-host:8766"), "{data}");
}

#[test]
fn test_history_is_most_recent_first() {
    let td = tempfile::tempdir().unwrap();
    run_iosmon(td.path(), &["--dry-run", "ws://one:1"]);
    run_iosmon(td.path(), &["--dry-run", "ws://two:2"]);
    run_iosmon(td.path(), &["--dry-run", "ws://one:1"]);
    let v: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(history_file(td.path())).unwrap()).unwrap();
    let urls: Vec<&str> = v["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["url"].as_str().unwrap())
        .collect();
    assert_eq!(urls, vec!["ws://one:1", "ws://two:2"]);

    // no URL: reuse the most recent entry
    let (_, text) = run_iosmon(td.path(), &["--dry-run"]);
    assert!(text.contains("ws://one:1"), "{text}");
}

#[test]
fn test_invalid_url_is_rejected_before_connecting() {
    let td = tempfile::tempdir().unwrap();
    let (_, text) = run_iosmon(td.path(), &["--dry-run", "http://nope"]);
    assert!(text.contains("unsupported scheme"), "{text}");
    assert!(!history_file(td.path()).exists());
}

#[test]
fn test_forget_and_theme_persist() {
    let td = tempfile::tempdir().unwrap();
    run_iosmon(td.path(), &["--dry-run", "--theme", "light", "ws://keep:1"]);
    run_iosmon(td.path(), &["--dry-run", "ws://drop:2"]);
    let (ok, _) = run_iosmon(td.path(), &["--forget", "ws://drop:2"]);
    assert!(ok);
    let data = fs::read_to_string(history_file(td.path())).unwrap();
    assert!(!data.contains("drop"), "{data}");
    assert!(data.contains("keep"));
    assert!(data.contains("\"light\""), "{data}");
}
