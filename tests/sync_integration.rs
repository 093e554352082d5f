//! Library-level synchronization tests against real git repositories.
//!
//! Each test builds a bare remote with the system `git` binary and drives
//! [`scoped_sync::sync`] against it through a plain local path, so no network
//! or credentials are involved. Tests are skipped when `git` is unavailable.

mod common;

use common::prelude::*;
use common::TEST_TOKEN;
use scoped_sync::credentials::EnvironmentOverlay;
use scoped_sync::error::ErrorKind;
use scoped_sync::exit_codes;
use scoped_sync::git::SystemGit;
use scoped_sync::input::InputRecord;
use scoped_sync::mask::{mask, Secret};
use scoped_sync::oplog::OperationLog;
use scoped_sync::shutdown::Shutdown;
use scoped_sync::sync::{synchronize, FinalState, RepositoryState, RepositorySync, Strategy, SyncResult};
use serial_test::serial;
use std::fs;
use std::path::Path;

fn sync(url: &str, branch: &str, target: &Path) -> (SyncResult, OperationLog) {
    let log = OperationLog::in_memory();
    let git = SystemGit::new(EnvironmentOverlay::non_interactive(), &log);
    let result = RepositorySync::new(&git, &log, url, branch, target).run();
    (result, log)
}

#[test]
fn test_fresh_clone_into_absent_directory() {
    require_git!();
    let remote = RemoteFixture::new();
    let target = remote.checkout();

    let (result, _) = sync(&remote.url(), "main", &target);

    assert_eq!(result.final_state, FinalState::Ready);
    assert_eq!(result.strategy, Some(Strategy::ShallowClone));
    assert!(target.join("README.md").exists());
    let commit = result.resolved_commit.unwrap();
    assert_ne!(commit, "unknown");
    assert!(remote.remote_head("main").starts_with(&commit));
    assert_eq!(result.branch.as_deref(), Some("main"));
}

#[test]
fn test_second_run_is_idempotent() {
    require_git!();
    let remote = RemoteFixture::new();
    let target = remote.checkout();

    let (first, _) = sync(&remote.url(), "main", &target);
    let (second, _) = sync(&remote.url(), "main", &target);

    assert!(first.is_ready());
    assert!(second.is_ready());
    assert_eq!(second.strategy, Some(Strategy::Update));
    assert_eq!(first.resolved_commit, second.resolved_commit);
    assert_eq!(git(&target, &["rev-list", "--count", "HEAD"]), "1");
}

#[test]
fn test_update_fast_forwards_to_new_remote_commits() {
    require_git!();
    let remote = RemoteFixture::new();
    let target = remote.checkout();
    sync(&remote.url(), "main", &target);

    let new_head = remote.commit("main", "CHANGELOG.md", "v2\n");
    let (result, _) = sync(&remote.url(), "main", &target);

    assert!(result.is_ready());
    assert_eq!(git(&target, &["rev-parse", "HEAD"]), new_head);
    assert!(target.join("CHANGELOG.md").exists());
}

#[test]
fn test_diverged_history_is_never_merged() {
    require_git!();
    let remote = RemoteFixture::new();
    let target = remote.checkout();
    sync(&remote.url(), "main", &target);

    remote.commit("main", "upstream.txt", "upstream\n");
    fs::write(target.join("local.txt"), "local\n").unwrap();
    git(&target, &["add", "local.txt"]);
    git(&target, &["commit", "--quiet", "-m", "local work"]);
    let local_head = git(&target, &["rev-parse", "HEAD"]);

    let (result, _) = sync(&remote.url(), "main", &target);

    assert_eq!(result.error_kind, Some(ErrorKind::DivergedHistory));
    assert_eq!(result.exit_code(), exit_codes::DIVERGED_HISTORY);
    assert_eq!(git(&target, &["rev-parse", "HEAD"]), local_head);
    assert!(!target.join("upstream.txt").exists());
}

#[test]
fn test_local_commits_ahead_of_remote_are_rejected() {
    require_git!();
    let remote = RemoteFixture::new();
    let target = remote.checkout();
    sync(&remote.url(), "main", &target);

    fs::write(target.join("local.txt"), "local\n").unwrap();
    git(&target, &["add", "local.txt"]);
    git(&target, &["commit", "--quiet", "-m", "local work"]);

    let (result, _) = sync(&remote.url(), "main", &target);
    assert_eq!(result.error_kind, Some(ErrorKind::DivergedHistory));
    assert!(target.join("local.txt").exists());
}

#[test]
fn test_origin_is_rewritten_to_requested_url() {
    require_git!();
    let remote = RemoteFixture::new();
    let target = remote.checkout();
    sync(&remote.url(), "main", &target);
    let mirror = remote.mirror();
    let mirror_url = mirror.to_string_lossy().into_owned();

    let (result, log) = sync(&mirror_url, "main", &target);

    assert!(result.is_ready());
    assert_eq!(git(&target, &["remote", "get-url", "origin"]), mirror_url);
    let messages: Vec<String> = log.entries().into_iter().map(|e| e.message).collect();
    let corrected = messages
        .iter()
        .position(|m| m.starts_with("correcting origin:"))
        .expect("origin correction is logged");
    let fetched = messages
        .iter()
        .position(|m| m.starts_with("run: git") && m.contains(" fetch --prune "))
        .expect("fetch ran");
    assert!(corrected < fetched);
}

#[test]
fn test_remote_branch_created_later_is_checked_out_tracking() {
    require_git!();
    let remote = RemoteFixture::new();
    let target = remote.checkout();
    sync(&remote.url(), "main", &target);
    let develop = remote.commit("develop", "dev.txt", "dev\n");

    let (result, _) = sync(&remote.url(), "develop", &target);

    assert!(result.is_ready());
    assert_eq!(result.branch.as_deref(), Some("develop"));
    assert_eq!(git(&target, &["rev-parse", "HEAD"]), develop);
    assert_eq!(
        git(&target, &["rev-parse", "--abbrev-ref", "develop@{upstream}"]),
        "origin/develop"
    );
}

#[test]
fn test_missing_branch_in_existing_checkout_is_branch_not_found() {
    require_git!();
    let remote = RemoteFixture::new();
    let target = remote.checkout();
    sync(&remote.url(), "main", &target);

    let (result, _) = sync(&remote.url(), "feature-x", &target);

    assert_eq!(result.error_kind, Some(ErrorKind::BranchNotFound));
    assert_eq!(result.exit_code(), exit_codes::BRANCH_NOT_FOUND);
    assert!(target.join(".git").exists());
}

#[test]
fn test_empty_remote_leaves_no_partial_clone() {
    require_git!();
    let remote = RemoteFixture::empty();
    let target = remote.checkout();

    let (result, _) = sync(&remote.url(), "feature-x", &target);

    assert_eq!(result.final_state, FinalState::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::BranchNotFound));
    assert!(!target.exists());
}

#[test]
fn test_clone_of_missing_branch_falls_back_to_default() {
    require_git!();
    let remote = RemoteFixture::new();
    let target = remote.checkout();

    let (result, log) = sync(&remote.url(), "release-42", &target);

    assert!(result.is_ready());
    assert_eq!(result.strategy, Some(Strategy::FallbackClone));
    assert_eq!(result.branch.as_deref(), Some("main"));
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("'release-42' does not exist on the remote")));
    assert!(log
        .entries()
        .iter()
        .any(|e| e.message.starts_with("shallow clone of branch 'release-42' failed")));
}

#[test]
fn test_unrelated_directory_is_a_conflict() {
    require_git!();
    let remote = RemoteFixture::new();
    let target = remote.checkout();
    fs::create_dir_all(&target).unwrap();
    fs::write(target.join("notes.txt"), "keep me").unwrap();

    let (result, _) = sync(&remote.url(), "main", &target);

    assert_eq!(result.error_kind, Some(ErrorKind::DirectoryConflict));
    assert_eq!(result.exit_code(), exit_codes::DIRECTORY_CONFLICT);
    assert_eq!(fs::read_to_string(target.join("notes.txt")).unwrap(), "keep me");
}

#[test]
fn test_subdirectory_of_another_checkout_is_unmanaged() {
    require_git!();
    let remote = RemoteFixture::new();
    let outer = remote.checkout();
    sync(&remote.url(), "main", &outer);
    let nested = outer.join("nested");
    fs::create_dir(&nested).unwrap();
    fs::write(nested.join("file.txt"), "x").unwrap();

    let log = OperationLog::in_memory();
    let git_ops = SystemGit::new(EnvironmentOverlay::non_interactive(), &log);
    assert_eq!(
        RepositoryState::detect(&git_ops, &nested).unwrap(),
        RepositoryState::PresentUnmanaged
    );
    assert_eq!(
        RepositoryState::detect(&git_ops, &outer).unwrap(),
        RepositoryState::PresentManaged
    );
}

#[test]
fn test_operation_log_file_records_the_run() {
    require_git!();
    let remote = RemoteFixture::new();
    let log = OperationLog::create(&remote.logs()).unwrap();
    let git_ops = SystemGit::new(EnvironmentOverlay::non_interactive(), &log);

    let result = RepositorySync::new(&git_ops, &log, &remote.url(), "main", &remote.checkout()).run();
    assert!(result.is_ready());

    let content = fs::read_to_string(log.path().unwrap()).unwrap();
    assert!(content.contains("transition: Start -> CloneFresh"));
    assert!(content.contains("run: git clone --depth 1 --single-branch --branch main --"));
    assert!(content.lines().all(|l| l.len() > 20 && l.as_bytes()[4] == b'-'));
}

#[test]
fn test_synchronize_local_url_uses_no_scope() {
    require_git!();
    let remote = RemoteFixture::new();
    let input = InputRecord::new(&remote.url(), None, None, Some(Secret::new(TEST_TOKEN))).unwrap();
    let log = OperationLog::in_memory();
    let shutdown = Shutdown::inert();

    let result = synchronize(&input, &remote.checkout(), &log, &shutdown);

    assert!(result.is_ready());
    assert!(input.secret().is_none());
    assert!(!log.entries().iter().any(|e| e.message.contains("credential scope")));
}

#[test]
#[serial]
fn test_https_scope_is_released_and_secret_never_logged() {
    require_git!();
    let remote = RemoteFixture::new();
    let log = OperationLog::create(&remote.logs()).unwrap();
    let shutdown = Shutdown::inert();
    // Nothing listens on port 1, so both clone attempts fail quickly.
    let input = InputRecord::new(
        "https://127.0.0.1:1/org/app.git",
        Some("main"),
        Some("deploy-bot"),
        Some(Secret::new(TEST_TOKEN)),
    )
    .unwrap();

    let previous = std::env::var_os("TMPDIR");
    std::env::set_var("TMPDIR", remote.tmp());
    let result = synchronize(&input, &remote.work().join("app"), &log, &shutdown);
    match previous {
        Some(value) => std::env::set_var("TMPDIR", value),
        None => std::env::remove_var("TMPDIR"),
    }

    assert_eq!(result.error_kind, Some(ErrorKind::CloneFailure));
    assert!(scope_dirs(&remote.tmp()).is_empty());
    assert!(!remote.work().join("app").exists());

    let content = fs::read_to_string(log.path().unwrap()).unwrap();
    assert!(!content.contains(TEST_TOKEN));
    assert!(content.contains(&mask(TEST_TOKEN)));
    assert!(content.contains("credential scope released"));
    let json = serde_json::to_string(&result).unwrap();
    assert!(!json.contains(TEST_TOKEN));
}

#[test]
#[serial]
fn test_synchronize_reports_scope_creation_failure() {
    let temp = TempDir::new().unwrap();
    let log = OperationLog::in_memory();
    let shutdown = Shutdown::inert();
    let input = InputRecord::new(
        "https://example.com/org/app.git",
        None,
        None,
        Some(Secret::new(TEST_TOKEN)),
    )
    .unwrap();

    let previous = std::env::var_os("TMPDIR");
    std::env::set_var("TMPDIR", temp.path().join("no-such-tmp"));
    let result = synchronize(&input, &temp.path().join("app"), &log, &shutdown);
    match previous {
        Some(value) => std::env::set_var("TMPDIR", value),
        None => std::env::remove_var("TMPDIR"),
    }

    assert_eq!(result.final_state, FinalState::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::ScopeCreationError));
    assert_eq!(result.exit_code(), exit_codes::SCOPE_CREATION);
    assert!(!temp.path().join("app").exists());
    assert!(!log.entries().iter().any(|e| e.message.starts_with("run: git")));
    assert!(!log.entries().iter().any(|e| e.message.contains(TEST_TOKEN)));
}
