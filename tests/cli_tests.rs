// Integration tests for the sidefx binary
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use assert_cmd::Command;
use predicates::prelude::*;
use sidefx::profiler::{CaseProfile, CaseProfiles, DiscardKind, DiscardedCase};
use sidefx::recorder::ApiRecord;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn record(name: &str, result: &str) -> ApiRecord {
    ApiRecord::new(name, "[]", "{}", result)
}

/// Baseline and candidate profiles for two cases; 0001 diverges
fn write_profiles(dir: &Path) -> (PathBuf, PathBuf) {
    let diverging = dir.join("0001.html");
    let same = dir.join("0002.html");

    let mut without = CaseProfiles::new();
    without.insert(
        &diverging,
        CaseProfile {
            records: vec![record("globalThis.Math.max", "1")],
            durations: vec![100.0, 100.0, 100.0, 100.0],
        },
    );
    without.insert(
        &same,
        CaseProfile {
            records: vec![record("globalThis.JSON.stringify", r#""{}""#)],
            durations: vec![100.0, 100.0, 100.0, 100.0],
        },
    );
    without.discard(DiscardedCase {
        case: dir.join("0003.html"),
        kind: DiscardKind::Flaky,
        reason: "flaky case: sample 2 diverged from the previous sample at record 0".into(),
    });

    let mut with = CaseProfiles::new();
    with.insert(
        &diverging,
        CaseProfile {
            records: vec![record("globalThis.Math.max", "2")],
            durations: vec![125.0, 125.0],
        },
    );
    with.insert(
        &same,
        CaseProfile {
            records: vec![record("globalThis.JSON.stringify", r#""{}""#)],
            durations: vec![101.0, 101.0],
        },
    );

    let without_file = dir.join("without.json");
    let with_file = dir.join("with.json");
    without.save(&without_file).unwrap();
    with.save(&with_file).unwrap();
    (without_file, with_file)
}

#[test]
fn test_bundle_prints_instrumentation() {
    Command::cargo_bin("sidefx")
        .unwrap()
        .arg("bundle")
        .assert()
        .success()
        .stdout(predicate::str::contains("__sidefx"))
        .stdout(predicate::str::contains("runAndRecordScript"));
}

#[test]
fn test_cases_lists_documents_sorted() {
    let dir = TempDir::new().unwrap();
    for name in ["b.html", "a.html", "a-resultDiff.txt"] {
        std::fs::write(dir.path().join(name), "").unwrap();
    }

    let output = Command::cargo_bin("sidefx")
        .unwrap()
        .arg("cases")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("a.html"));
    assert!(lines[1].ends_with("b.html"));
}

#[test]
fn test_analyze_behavior_text() {
    let dir = TempDir::new().unwrap();
    let (without, with) = write_profiles(dir.path());

    Command::cargo_bin("sidefx")
        .unwrap()
        .args(["analyze", "--without"])
        .arg(&without)
        .arg("--with")
        .arg(&with)
        .assert()
        .success()
        .stdout(predicate::str::contains("❌ 0001.html: behavior difference in globalThis.Math.max"))
        .stdout(predicate::str::contains("✅ 0002.html: no difference"))
        .stdout(predicate::str::contains("discarded (flaky)"));

    assert!(dir.path().join("0001-resultDiff.txt").exists());
    assert!(!dir.path().join("0002-resultDiff.txt").exists());
}

#[test]
fn test_analyze_performance_json() {
    let dir = TempDir::new().unwrap();
    let (without, with) = write_profiles(dir.path());

    let output = Command::cargo_bin("sidefx")
        .unwrap()
        .args(["analyze", "--mode", "performance", "--threshold", "0.2", "--format", "json"])
        .arg("--without")
        .arg(&without)
        .arg("--with")
        .arg(&with)
        .output()
        .unwrap();
    assert!(output.status.success());

    let results: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["fileName"], "0001.html");
    assert_eq!(results[0]["duration"]["isOverThreshold"], true);
    assert_eq!(results[0]["duration"]["durationWithScript"], 125.0);
    assert_eq!(results[1]["duration"]["isOverThreshold"], false);
}

#[test]
fn test_analyze_performance_requires_threshold() {
    let dir = TempDir::new().unwrap();
    let (without, with) = write_profiles(dir.path());

    Command::cargo_bin("sidefx")
        .unwrap()
        .args(["analyze", "--mode", "performance"])
        .arg("--without")
        .arg(&without)
        .arg("--with")
        .arg(&with)
        .assert()
        .failure()
        .stderr(predicate::str::contains("performance_threshold"));
}

#[test]
fn test_analyze_reads_config_file() {
    let dir = TempDir::new().unwrap();
    let (without, with) = write_profiles(dir.path());
    let config = dir.path().join("sidefx.toml");
    std::fs::write(&config, "mode = \"performance\"\nperformance_threshold = 0.5\n").unwrap();

    Command::cargo_bin("sidefx")
        .unwrap()
        .arg("analyze")
        .arg("--config")
        .arg(&config)
        .arg("--without")
        .arg(&without)
        .arg("--with")
        .arg(&with)
        .assert()
        .success()
        .stdout(predicate::str::contains("sidefx performance report"));
}

#[test]
fn test_analyze_missing_profiles_fails() {
    Command::cargo_bin("sidefx")
        .unwrap()
        .args(["analyze", "--without", "/nope/a.json", "--with", "/nope/b.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read profiles"));
}
