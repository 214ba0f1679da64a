use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::File;
use std::io::Write;
use tempfile::{tempdir, TempDir};

fn create_test_files(dir: &TempDir, files: &[(&str, &str)]) -> Result<()> {
    for (name, content) in files {
        let file_path = dir.path().join(name);
        let mut file = File::create(file_path)?;
        writeln!(file, "{}", content)?;
    }
    Ok(())
}

fn logscout(dir: &TempDir) -> Result<Command> {
    let mut cmd = Command::cargo_bin("logscout")?;
    cmd.current_dir(dir.path()).env("NO_COLOR", "1").env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn test_scan_totals() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(
        &temp_dir,
        &[("app.log", "ERROR 500\nINFO ok\nERROR 404\nERROR 500")],
    )?;

    logscout(&temp_dir)?
        .args(["scan", "-d", ".", "-f", "app.log", "-p", r"error=ERROR (?P<code>\d+)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Totals"))
        .stdout(predicate::str::contains("(3 hits)"))
        .stdout(predicate::str::contains("500: 2"))
        .stdout(predicate::str::contains("404: 1"))
        .stdout(predicate::str::contains("Scanned 1 files (0 failed"));
    Ok(())
}

#[test]
fn test_scan_view_and_per_file() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(
        &temp_dir,
        &[("a.log", "ERROR 500 upstream"), ("b.log", "INFO nothing")],
    )?;

    logscout(&temp_dir)?
        .args(["scan", "-d", ".", "-f", "*.log", "-p", "error=ERROR", "--view", "--per-file"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1: ERROR 500 upstream"))
        .stdout(predicate::str::contains("b.log"))
        .stdout(predicate::str::contains("Scanned 2 files"));
    Ok(())
}

#[test]
fn test_scan_json() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(&temp_dir, &[("app.log", "ERROR 500")])?;

    let output = logscout(&temp_dir)?
        .args(["scan", "-d", ".", "-f", "app.log", "-p", r"error=ERROR (?P<code>\d+)", "--json"])
        .output()?;
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["aggregate"]["regexes"]["error"]["total_hits"], 1);
    assert_eq!(
        report["aggregate"]["regexes"]["error"]["group_hits"]["code"]["500"],
        1
    );
    assert_eq!(report["cancelled"], false);
    Ok(())
}

#[test]
fn test_scan_config_file() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(&temp_dir, &[("worker.log", "WARN disk\nWARN disk")])?;
    let config = format!(
        "targets:\n  default_path: {}\n  default_filename: worker.log\npatterns:\n  - name: warn\n    pattern: WARN\n",
        temp_dir.path().display()
    );
    create_test_files(&temp_dir, &[("scan.yaml", config.as_str())])?;

    logscout(&temp_dir)?
        .args(["scan", "--config", "scan.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(2 hits)"));
    Ok(())
}

#[test]
fn test_unreadable_file_is_reported_not_fatal() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(&temp_dir, &[("app.log", "ERROR 1")])?;
    // gzip magic followed by garbage
    std::fs::write(
        temp_dir.path().join("broken.log.gz"),
        [0x1f, 0x8b, 0x08, 0x00, 0xde, 0xad, 0xbe, 0xef],
    )?;

    logscout(&temp_dir)?
        .args([
            "scan", "-d", ".", "-f", "app.log", "-f", "broken.log.gz", "-p", "error=ERROR",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("failed:"))
        .stderr(predicate::str::contains("broken.log.gz"))
        .stdout(predicate::str::contains("Scanned 1 files (1 failed"));
    Ok(())
}

#[test]
fn test_duplicate_pattern_fails() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(&temp_dir, &[("app.log", "ERROR 1")])?;

    logscout(&temp_dir)?
        .args(["scan", "-d", ".", "-f", "app.log", "-p", "e=ERROR", "-p", "e=FATAL"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate regex name: e"));
    Ok(())
}

#[test]
fn test_missing_path_fails() -> Result<()> {
    let temp_dir = tempdir()?;

    logscout(&temp_dir)?
        .args(["scan", "-f", "app.log", "-p", "e=ERROR"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("default_path"));
    Ok(())
}

#[test]
fn test_bad_pattern_argument() -> Result<()> {
    let temp_dir = tempdir()?;

    logscout(&temp_dir)?
        .args(["scan", "-d", ".", "-f", "app.log", "-p", "no-equals-sign"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected NAME=REGEX"));
    Ok(())
}

#[test]
fn test_unmapped_level_fails() -> Result<()> {
    let temp_dir = tempdir()?;
    create_test_files(&temp_dir, &[("app.log", "ERROR 1")])?;

    logscout(&temp_dir)?
        .args(["scan", "-d", ".", "-f", "app.log", "--level", "staging", "-p", "e=ERROR"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("levels_to_boxes"));
    Ok(())
}
