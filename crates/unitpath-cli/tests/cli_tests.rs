//! CLI integration tests using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SAMPLE: &str = "../../catalogs/sample.toml";

fn unitpath() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("unitpath").unwrap();
    cmd.env_remove("UNITPATH_DATA_DIR").env_remove("UNITPATH_BIND");
    cmd
}

/// Write a config pointing at the sample catalog and a data dir inside `dir`.
fn write_config(dir: &Path) -> PathBuf {
    let catalog = std::fs::canonicalize(SAMPLE).unwrap();
    let config = format!(
        r#"
[store]
type = "json"
path = "{}"

[content]
type = "catalog"
path = "{}"
"#,
        dir.join("data").display(),
        catalog.display()
    );
    let path = dir.join("unitpath.toml");
    std::fs::write(&path, config).unwrap();
    path
}

#[test]
fn validate_sample_catalog() {
    unitpath()
        .arg("validate")
        .arg("--catalog")
        .arg(SAMPLE)
        .assert()
        .success()
        .stdout(predicate::str::contains("Math - Grade 3"))
        .stdout(predicate::str::contains("4 units"))
        .stdout(predicate::str::contains("9 exercises"))
        .stdout(predicate::str::contains("All catalogs valid"));
}

#[test]
fn validate_directory() {
    unitpath()
        .arg("validate")
        .arg("--catalog")
        .arg("../../catalogs")
        .assert()
        .success()
        .stdout(predicate::str::contains("Math - Grade 3"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(
        &path,
        r#"
[[tracks]]
subject_code = "math"
name = "Broken"

[[tracks.units]]
id = "u1"
name = "Empty"

[[tracks.units]]
id = "u2"
name = "Bad key"

[[tracks.units.exercises]]
id = "e1"
kind = "choice"
prompt = "?"
options = ["a", "b"]
correct_answer = 5
"#,
    )
    .unwrap();

    unitpath()
        .arg("validate")
        .arg("--catalog")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[u1] WARNING"))
        .stdout(predicate::str::contains("[e1] WARNING"))
        .stdout(predicate::str::contains("2 warning(s) found"));
}

#[test]
fn validate_nonexistent_file() {
    unitpath()
        .arg("validate")
        .arg("--catalog")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn check_correct_and_incorrect() {
    unitpath()
        .args(["check", "--catalog", SAMPLE, "--exercise", "pv-1"])
        .args(["--answer", r#"{"type":"choice","selected":1}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("pv-1: correct"));

    unitpath()
        .args(["check", "--catalog", SAMPLE, "--exercise", "pv-1"])
        .args(["--answer", r#"{"type":"choice","selected":0}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("pv-1: incorrect"))
        .stdout(predicate::str::contains("Help: Count places"));
}

#[test]
fn check_fill_blank_and_matching() {
    unitpath()
        .args(["check", "--catalog", SAMPLE, "--exercise", "add-2"])
        .args(["--answer", r#"{"type":"fill_blank","blanks":["  Seven Hundred  Fifty "]}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("add-2: correct"));

    unitpath()
        .args(["check", "--catalog", SAMPLE, "--exercise", "pv-3"])
        .args(["--answer", r#"{"type":"matching","pairs":{"0":2,"1":0,"2":1}}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("pv-3: correct"));
}

#[test]
fn check_application_is_ungraded() {
    unitpath()
        .args(["check", "--catalog", SAMPLE, "--exercise", "cp-2"])
        .args(["--answer", r#"{"type":"application","text":"3 cups"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("ungraded"));
}

#[test]
fn check_rejects_wrong_answer_type() {
    unitpath()
        .args(["check", "--catalog", SAMPLE, "--exercise", "pv-1"])
        .args(["--answer", r#"{"type":"fill_blank","blanks":["7"]}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected a choice answer"));
}

#[test]
fn check_unknown_exercise() {
    unitpath()
        .args(["check", "--catalog", SAMPLE, "--exercise", "nope"])
        .args(["--answer", r#"{"type":"choice","selected":1}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exercise not found: nope"));
}

#[test]
fn progress_for_new_student() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    unitpath()
        .args(["progress", "--student", "s1", "--subject", "math", "--grade", "3"])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Math - Grade 3 for s1"))
        .stdout(predicate::str::contains("math3-place-value"))
        .stdout(predicate::str::contains("0/3"))
        .stdout(predicate::str::contains("locked"));
}

#[test]
fn progress_as_json() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let output = unitpath()
        .args(["progress", "--student", "s1", "--subject", "math", "--format", "json"])
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let units = value["track"]["units"].as_array().unwrap();
    assert_eq!(units.len(), 4);
    assert_eq!(units[0]["accessible"], true);
    assert_eq!(units[1]["accessible"], false);
    // The checkpoint never blocks its successor.
    assert_eq!(units[3]["accessible"], true);
    assert_eq!(value["progress"][0]["totalExercises"], 3);
}

#[test]
fn progress_unknown_track() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    unitpath()
        .args(["progress", "--student", "s1", "--subject", "art"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("art"));
}

#[test]
fn access_locked_and_open() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    unitpath()
        .args(["access", "--student", "s1", "--unit", "math3-addition"])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("locked"))
        .stdout(predicate::str::contains("complete the previous unit first"));

    unitpath()
        .args(["access", "--student", "s1", "--unit", "math3-place-value"])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("open"))
        .stdout(predicate::str::contains("first unit of the track"));
}

#[test]
fn forget_unknown_student() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    unitpath()
        .args(["forget", "--student", "ghost"])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 record(s) for ghost"));
}

#[test]
fn missing_config_file() {
    unitpath()
        .args(["access", "--student", "s1", "--unit", "u1"])
        .args(["--config", "no_such_config.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file not found"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    unitpath()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created unitpath.toml"))
        .stdout(predicate::str::contains("Created catalogs/example.toml"));

    assert!(dir.path().join("unitpath.toml").exists());
    assert!(dir.path().join("catalogs/example.toml").exists());

    // The generated catalog is itself valid.
    unitpath()
        .current_dir(dir.path())
        .args(["validate", "--catalog", "catalogs/example.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All catalogs valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    unitpath().current_dir(dir.path()).arg("init").assert().success();

    unitpath()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn init_config_is_loadable() {
    let dir = TempDir::new().unwrap();
    unitpath().current_dir(dir.path()).arg("init").assert().success();

    unitpath()
        .current_dir(dir.path())
        .args(["progress", "--student", "s1", "--subject", "math", "--grade", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("math1-counting"));
}

#[test]
fn help_output() {
    unitpath()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Exercise evaluation and unit progression engine",
        ));
}

#[test]
fn version_output() {
    unitpath()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("unitpath"));
}
