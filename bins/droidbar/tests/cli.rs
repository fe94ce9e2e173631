use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// `droidbar` running in `dir` with no user-level config in reach
fn droidbar(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("droidbar").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("RUST_LOG");
    cmd
}

#[cfg(unix)]
fn script(dir: &Path, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    droidbar(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("logcat"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_missing_explicit_config_is_config_error() {
    let dir = TempDir::new().unwrap();
    droidbar(dir.path())
        .args(["--config", "missing.toml", "doctor"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("E3001"));
}

#[test]
fn test_launch_without_package_fails() {
    let dir = TempDir::new().unwrap();
    droidbar(dir.path())
        .arg("launch")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No application package configured"));
}

#[test]
fn test_build_without_wrapper_fails() {
    let dir = TempDir::new().unwrap();
    droidbar(dir.path())
        .args(["-q", "build"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("E5002"));
}

#[test]
fn test_doctor_json_report() {
    let dir = TempDir::new().unwrap();
    let output = droidbar(dir.path())
        .args(["doctor", "--json"])
        .output()
        .unwrap();

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let checks = report["checks"].as_array().unwrap();
    assert!(checks.iter().any(|c| c["name"] == "gradlew"));
    assert!(report["status"].is_string());
}

#[cfg(unix)]
#[test]
fn test_exec_passes_through_exit_code() {
    let dir = TempDir::new().unwrap();
    droidbar(dir.path())
        .args(["-q", "exec", "echo", "hello;", "exit", "7"])
        .assert()
        .code(7)
        .stdout(predicate::str::contains("hello"))
        .stderr(predicate::str::contains("Command failed with status: 7"));
}

#[cfg(unix)]
#[test]
fn test_build_runs_wrapper() {
    let dir = TempDir::new().unwrap();
    script(dir.path(), "gradlew", "echo \"task $1\"");

    droidbar(dir.path())
        .args(["-q", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("task assembleDebug"));
}

#[cfg(unix)]
#[test]
fn test_run_stops_at_first_failure() {
    let dir = TempDir::new().unwrap();
    script(
        dir.path(),
        "gradlew",
        "echo \"task $1\"\n[ \"$1\" = assembleDebug ] && exit 4\nexit 0",
    );

    droidbar(dir.path())
        .arg("run")
        .assert()
        .code(4)
        .stdout(predicate::str::contains("task assembleDebug"))
        .stdout(predicate::str::contains("installDebug").not());
}

#[cfg(unix)]
#[test]
fn test_logcat_streams_until_exit() {
    let dir = TempDir::new().unwrap();
    script(dir.path(), "fake-adb", "for i in 1 2 3; do echo \"line $i\"; done");
    std::fs::write(
        dir.path().join(".droidbar.toml"),
        format!("[adb]\npath = \"{}\"\n", dir.path().join("fake-adb").display()),
    )
    .unwrap();

    droidbar(dir.path())
        .arg("logcat")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("line 1\nline 2\nline 3"));
}
