//! End-to-end tests for the `sync`, `inspect` and `completions` commands.

mod common;

use common::prelude::*;
use std::fs;

#[test]
fn test_sync_clones_and_prints_summary() {
    require_git!();
    let remote = RemoteFixture::new();

    remote
        .command()
        .args(["sync", "--repo-url", &remote.url()])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[OK] Ready: "))
        .stdout(predicate::str::contains("branch: main"))
        .stdout(predicate::str::contains("[LOG] log: "));

    assert!(remote.checkout().join("README.md").exists());
}

#[test]
fn test_sync_twice_updates_in_place() {
    require_git!();
    let remote = RemoteFixture::new();

    for _ in 0..2 {
        remote
            .command()
            .args(["sync", "--repo-url", &remote.url()])
            .assert()
            .success();
    }

    let log = remote.log_text();
    assert!(log.contains("transition: Start -> CloneFresh"));
    assert!(log.contains("transition: Start -> UpdateExisting"));
    assert!(log.contains("transition: FastForward -> Ready"));
}

#[test]
fn test_sync_respects_dir_and_workdir() {
    require_git!();
    let remote = RemoteFixture::new();
    let workdir = remote.path().join("elsewhere");
    fs::create_dir(&workdir).unwrap();

    remote
        .command()
        .args(["sync", "--repo-url", &remote.url(), "--dir", "checkout"])
        .arg("--workdir")
        .arg(&workdir)
        .assert()
        .success();

    assert!(workdir.join("checkout").join("README.md").exists());
    assert!(!remote.checkout().exists());
}

#[test]
fn test_sync_json_output() {
    require_git!();
    let remote = RemoteFixture::new();
    let expected = remote.remote_head("main");

    let output = remote
        .command()
        .args([
            "sync",
            "--repo-url",
            &remote.url(),
            "--json",
            "--deploy-host",
            "deploy.example.com",
            "--deploy-port",
            "2222",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["final_state"], "Ready");
    assert_eq!(json["transport"], "local");
    assert_eq!(json["branch"], "main");
    assert_eq!(json["strategy"], "shallow_clone");
    assert!(expected.starts_with(json["resolved_commit"].as_str().unwrap()));
    assert_eq!(json["deploy"]["host"], "deploy.example.com");
    assert_eq!(json["deploy"]["port"], 2222);
    assert!(json["log_file"].as_str().unwrap().contains("sync_"));
}

#[test]
fn test_sync_json_output_on_failure() {
    require_git!();
    let remote = RemoteFixture::new();
    fs::create_dir_all(remote.checkout()).unwrap();
    fs::write(remote.checkout().join("notes.txt"), "x").unwrap();

    let output = remote
        .command()
        .args(["sync", "--repo-url", &remote.url(), "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(scoped_sync::exit_codes::DIRECTORY_CONFLICT));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["final_state"], "Failed");
    assert_eq!(json["error_kind"], "DirectoryConflict");
}

#[test]
fn test_sync_warns_when_branch_missing_at_clone() {
    require_git!();
    let remote = RemoteFixture::new();

    remote
        .command()
        .args(["sync", "--repo-url", &remote.url(), "--branch", "release-42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[WARN]"))
        .stdout(predicate::str::contains("release-42"));
}

#[test]
fn test_sync_writes_timestamped_log_file() {
    require_git!();
    let remote = RemoteFixture::new();

    remote
        .command()
        .args(["sync", "--repo-url", &remote.url()])
        .assert()
        .success();

    let names: Vec<String> = fs::read_dir(remote.logs())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("sync_") && names[0].ends_with(".log"));
    assert!(remote.log_text().contains("run: git "));
}

#[test]
fn test_inspect_reports_states() {
    require_git!();
    let remote = RemoteFixture::new();

    remote
        .command()
        .arg("inspect")
        .arg(remote.checkout())
        .assert()
        .success()
        .stdout(predicate::str::contains("absent"));

    remote
        .command()
        .args(["sync", "--repo-url", &remote.url()])
        .assert()
        .success();

    remote
        .command()
        .arg("inspect")
        .arg(remote.checkout())
        .assert()
        .success()
        .stdout(predicate::str::contains("managed checkout"))
        .stdout(predicate::str::contains("branch: main"))
        .stdout(predicate::str::contains(remote.url()));
}

#[test]
fn test_inspect_json() {
    let temp = TempDir::new().unwrap();
    temp.child("notes.txt").write_str("x").unwrap();

    let output = cargo_bin_cmd!("scoped-sync")
        .arg("inspect")
        .arg(temp.path())
        .arg("--json")
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["state"], "PresentUnmanaged");
}

#[test]
fn test_completions_bash() {
    cargo_bin_cmd!("scoped-sync")
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scoped-sync"));
}
