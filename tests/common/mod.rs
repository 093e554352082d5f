//! Shared test utilities for integration and E2E tests.
//!
//! Fixtures build real git repositories with the system `git` binary: a bare
//! "remote" plus a seed clone used to push commits into it. Tests that need
//! git should start with `require_git!()`, which skips them when no `git`
//! binary is available.
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     require_git!();
//!     let remote = RemoteFixture::new();
//!     remote.commit("main", "README.md", "# hello");
//! }
//! ```

#![allow(dead_code)]

use assert_fs::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{git, git_available, scope_dirs, RemoteFixture};
    #[allow(unused_imports)]
    pub use crate::require_git;
}

/// Token used wherever a test needs a secret; asserted absent from outputs.
pub const TEST_TOKEN: &str = "ghp_TestTokenValue_9f8e7d";

/// Skip the current test when `git` is not installed.
#[macro_export]
macro_rules! require_git {
    () => {
        if !$crate::common::git_available() {
            eprintln!("git not available; skipping");
            return;
        }
    };
}

/// Whether a usable `git` binary is on `PATH`.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git in `dir` and return trimmed stdout, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_AUTHOR_NAME", "Test Author")
        .env("GIT_AUTHOR_EMAIL", "author@example.com")
        .env("GIT_COMMITTER_NAME", "Test Author")
        .env("GIT_COMMITTER_EMAIL", "author@example.com")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} in {} failed: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Credential scope directories left under `parent`.
pub fn scope_dirs(parent: &Path) -> Vec<PathBuf> {
    fs::read_dir(parent)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().starts_with("scoped-sync-"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A bare remote repository with a seed clone for pushing commits.
///
/// Layout inside the temporary directory:
/// - `remote.git/` the bare remote, `HEAD` pointing at `main`
/// - `seed/` working clone used to create commits
/// - `work/` empty directory for checkouts under test
/// - `logs/` operation log directory
/// - `tmp/` private temporary directory for credential scopes
pub struct RemoteFixture {
    temp_dir: assert_fs::TempDir,
}

impl RemoteFixture {
    /// A remote whose `main` branch has one commit.
    pub fn new() -> Self {
        let fixture = Self::empty();
        fixture.commit("main", "README.md", "# app\n");
        fixture
    }

    /// A remote without any commits.
    pub fn empty() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        for dir in ["work", "logs", "tmp"] {
            temp_dir.child(dir).create_dir_all().expect("Failed to create fixture dir");
        }

        let remote = temp_dir.path().join("remote.git");
        fs::create_dir(&remote).expect("Failed to create remote dir");
        git(&remote, &["init", "--quiet", "--bare"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let seed = temp_dir.path().join("seed");
        fs::create_dir(&seed).expect("Failed to create seed dir");
        git(&seed, &["init", "--quiet"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&seed, &["remote", "add", "origin", &remote.to_string_lossy()]);

        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// URL of the bare remote (a plain local path).
    pub fn url(&self) -> String {
        self.remote_path().to_string_lossy().into_owned()
    }

    pub fn remote_path(&self) -> PathBuf {
        self.path().join("remote.git")
    }

    pub fn work(&self) -> PathBuf {
        self.path().join("work")
    }

    pub fn logs(&self) -> PathBuf {
        self.path().join("logs")
    }

    pub fn tmp(&self) -> PathBuf {
        self.path().join("tmp")
    }

    /// Default checkout location, `work/remote`.
    pub fn checkout(&self) -> PathBuf {
        self.work().join("remote")
    }

    /// Commit `content` to `file` on `branch` and push it. New branches start
    /// from the seed's current `main`. Returns the full commit hash.
    pub fn commit(&self, branch: &str, file: &str, content: &str) -> String {
        let seed = self.path().join("seed");
        let has_main = Command::new("git")
            .arg("-C")
            .arg(&seed)
            .args(["rev-parse", "--verify", "--quiet", "refs/heads/main"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);

        if branch != "main" || has_main {
            let exists = Command::new("git")
                .arg("-C")
                .arg(&seed)
                .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", branch)])
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false);
            if exists {
                git(&seed, &["checkout", "--quiet", branch]);
            } else {
                git(&seed, &["checkout", "--quiet", "-b", branch, "main"]);
            }
        }

        fs::write(seed.join(file), content).expect("Failed to write seed file");
        git(&seed, &["add", file]);
        git(&seed, &["commit", "--quiet", "-m", &format!("update {} on {}", file, branch)]);
        git(&seed, &["push", "--quiet", "origin", branch]);
        git(&seed, &["rev-parse", "HEAD"])
    }

    /// Full hash of `branch` on the remote.
    pub fn remote_head(&self, branch: &str) -> String {
        git(&self.remote_path(), &["rev-parse", &format!("refs/heads/{}", branch)])
    }

    /// A second bare remote with the same history, for origin rewrites.
    pub fn mirror(&self) -> PathBuf {
        let mirror = self.path().join("mirror.git");
        git(
            self.path(),
            &["clone", "--quiet", "--bare", &self.url(), &mirror.to_string_lossy()],
        );
        mirror
    }

    /// A `scoped-sync` command with a clean environment, logging into `logs/`
    /// and creating credential scopes under `tmp/`.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("scoped-sync");
        cmd.current_dir(self.work())
            .env_remove("SCOPED_SYNC_TOKEN")
            .env_remove("SCOPED_SYNC_REPO_URL")
            .env_remove("SCOPED_SYNC_BRANCH")
            .env_remove("SCOPED_SYNC_USERNAME")
            .env("SCOPED_SYNC_LOG_DIR", self.logs())
            .env("TMPDIR", self.tmp())
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .arg("--color")
            .arg("never");
        cmd
    }

    /// Concatenated content of every operation log written so far.
    pub fn log_text(&self) -> String {
        fs::read_dir(self.logs())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| fs::read_to_string(e.path()).ok())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_dirs_filters_by_prefix() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("scoped-sync-abc123").create_dir_all().unwrap();
        temp.child("other").create_dir_all().unwrap();
        assert_eq!(scope_dirs(temp.path()).len(), 1);
    }

    #[test]
    fn test_fixture_pushes_commits() {
        if !git_available() {
            return;
        }
        let remote = RemoteFixture::new();
        let head = remote.commit("develop", "dev.txt", "dev");
        assert_eq!(remote.remote_head("develop"), head);
        assert_ne!(remote.remote_head("main"), head);
    }
}
