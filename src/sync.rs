//! # Repository Synchronization
//!
//! Brings a local directory in line with a remote branch.
//!
//! ## State Machine
//!
//! ```text
//! Start ─┬─ Absent ──────────► CloneFresh ─────────────────────────────────┐
//!        ├─ PresentManaged ──► UpdateExisting ─► BranchResolution ─► FastForward ─► Ready
//!        └─ PresentUnmanaged ─► Failed(DirectoryConflict)
//! ```
//!
//! Every phase is a transition function returning the next [`Phase`] or the
//! [`Error`] the run fails with. `Failed` is absorbing: the first error ends
//! the run.
//!
//! - **CloneFresh** tries a shallow clone of the requested branch, then falls
//!   back once to a full clone of the default branch. After the fallback the
//!   requested branch is checked out as a tracking branch when the remote has
//!   it; otherwise the run stays on the default branch with a warning. If the
//!   run fails after creating the directory, the partial clone is removed.
//! - **UpdateExisting** corrects the `origin` URL (logged, never silent) and
//!   fetches with pruning.
//! - **BranchResolution** prefers the remote branch, then a local one, and
//!   never invents a branch.
//! - **FastForward** refuses diverged history before pulling with
//!   `--ff-only`, so local commits are never merged, rebased or reset away.
//!
//! [`synchronize`] wraps the state machine in a credential scope for HTTPS
//! URLs and releases the scope before returning.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::credentials::{CredentialScope, EnvironmentOverlay};
use crate::error::{Error, ErrorKind, Result};
use crate::exit_codes;
use crate::git::{GitOperations, SystemGit, ORIGIN};
use crate::input::{redact_url, InputRecord};
use crate::oplog::OperationLog;
use crate::shutdown::Shutdown;

/// Commit recorded when HEAD cannot be resolved after a successful run.
pub const UNKNOWN_COMMIT: &str = "unknown";

/// What is at the target path before a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepositoryState {
    /// Nothing there, or an empty directory.
    Absent,
    /// The top level of a git work tree.
    PresentManaged,
    /// Anything else: files, a subdirectory of another repository, a broken `.git`.
    PresentUnmanaged,
}

impl RepositoryState {
    /// Inspect `dir`. Never cached; call it at the start of each run.
    pub fn detect<G: GitOperations + ?Sized>(git: &G, dir: &Path) -> Result<Self> {
        let inaccessible = |e: io::Error| Error::RepositoryInaccessible {
            path: dir.to_path_buf(),
            message: e.to_string(),
        };

        let metadata = match fs::metadata(dir) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::Absent),
            Err(e) => return Err(inaccessible(e)),
        };
        if !metadata.is_dir() {
            return Ok(Self::PresentUnmanaged);
        }
        if fs::read_dir(dir).map_err(inaccessible)?.next().is_none() {
            return Ok(Self::Absent);
        }
        if fs::symlink_metadata(dir.join(".git")).is_err() {
            return Ok(Self::PresentUnmanaged);
        }

        let expected = dir.canonicalize().map_err(inaccessible)?;
        match git.work_tree_root(dir).and_then(|root| root.canonicalize().ok()) {
            Some(root) if root == expected => Ok(Self::PresentManaged),
            _ => Ok(Self::PresentUnmanaged),
        }
    }
}

/// Phases of the synchronization state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    CloneFresh,
    UpdateExisting,
    BranchResolution,
    FastForward,
    Ready,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "Start",
            Phase::CloneFresh => "CloneFresh",
            Phase::UpdateExisting => "UpdateExisting",
            Phase::BranchResolution => "BranchResolution",
            Phase::FastForward => "FastForward",
            Phase::Ready => "Ready",
        };
        f.write_str(name)
    }
}

/// How the checkout was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Shallow clone of the requested branch.
    ShallowClone,
    /// Full clone after the shallow clone failed.
    FallbackClone,
    /// Existing checkout updated in place.
    Update,
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FinalState {
    Ready,
    Failed,
}

/// Outcome of one run.
#[derive(Debug, Serialize)]
pub struct SyncResult {
    pub final_state: FinalState,
    pub directory: PathBuf,
    /// Branch checked out at the end of a successful run.
    pub branch: Option<String>,
    /// Short hash of HEAD, or `"unknown"` when it could not be resolved.
    pub resolved_commit: Option<String>,
    pub strategy: Option<Strategy>,
    pub warnings: Vec<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    #[serde(skip)]
    error: Option<Error>,
}

impl SyncResult {
    fn failed(directory: PathBuf, error: Error, strategy: Option<Strategy>, warnings: Vec<String>) -> Self {
        Self {
            final_state: FinalState::Failed,
            directory,
            branch: None,
            resolved_commit: None,
            strategy,
            warnings,
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
            error: Some(error),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.final_state == FinalState::Ready
    }

    /// The error the run failed with.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Exit code for the process reporting this result.
    pub fn exit_code(&self) -> i32 {
        self.error_kind
            .map(ErrorKind::exit_code)
            .unwrap_or(exit_codes::SUCCESS)
    }

    /// Convert into a `Result`, giving up the diagnostics of a failed run.
    pub fn into_result(mut self) -> Result<Self> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

/// The reconciliation state machine for one target directory.
pub struct RepositorySync<'a, G: GitOperations + ?Sized> {
    git: &'a G,
    log: &'a OperationLog,
    url: &'a str,
    branch: &'a str,
    target: PathBuf,
    strategy: Option<Strategy>,
    warnings: Vec<String>,
    /// Set when CloneFresh owns the target and must clean it up on failure.
    clone_cleanup: Option<CloneCleanup>,
    /// Whether the requested branch exists on origin after fetching.
    has_upstream: bool,
}

#[derive(Debug, Clone, Copy)]
enum CloneCleanup {
    /// Remove the directory.
    RemoveDir,
    /// The directory existed empty before the run; empty it again.
    ClearDir,
}

impl<'a, G: GitOperations + ?Sized> RepositorySync<'a, G> {
    pub fn new(git: &'a G, log: &'a OperationLog, url: &'a str, branch: &'a str, target: &Path) -> Self {
        Self {
            git,
            log,
            url,
            branch,
            target: target.to_path_buf(),
            strategy: None,
            warnings: Vec::new(),
            clone_cleanup: None,
            has_upstream: false,
        }
    }

    /// Drive the state machine to `Ready` or `Failed`.
    pub fn run(mut self) -> SyncResult {
        let mut phase = Phase::Start;
        loop {
            let next = match phase {
                Phase::Start => self.start(),
                Phase::CloneFresh => self.clone_fresh(),
                Phase::UpdateExisting => self.update_existing(),
                Phase::BranchResolution => self.resolve_branch(),
                Phase::FastForward => self.fast_forward(),
                Phase::Ready => return self.finish(),
            };
            match next {
                Ok(next) => {
                    self.log.record(format!("transition: {} -> {}", phase, next));
                    phase = next;
                }
                Err(error) => return self.fail(phase, error),
            }
        }
    }

    fn warn(&mut self, message: String) {
        self.log.warn(&message);
        self.warnings.push(message);
    }

    fn start(&mut self) -> Result<Phase> {
        let state = RepositoryState::detect(self.git, &self.target)?;
        self.log.record(format!(
            "repository state of {}: {:?}",
            self.target.display(),
            state
        ));
        match state {
            RepositoryState::Absent => {
                self.clone_cleanup = Some(if self.target.exists() {
                    CloneCleanup::ClearDir
                } else {
                    CloneCleanup::RemoveDir
                });
                Ok(Phase::CloneFresh)
            }
            RepositoryState::PresentManaged => Ok(Phase::UpdateExisting),
            RepositoryState::PresentUnmanaged => Err(Error::DirectoryConflict {
                path: self.target.clone(),
            }),
        }
    }

    fn clone_fresh(&mut self) -> Result<Phase> {
        match self.git.clone_shallow(self.url, self.branch, &self.target) {
            Ok(()) => {
                self.strategy = Some(Strategy::ShallowClone);
                return Ok(Phase::Ready);
            }
            Err(e) => self.warn(format!(
                "shallow clone of branch '{}' failed ({}); falling back to a full clone",
                self.branch,
                git_detail(&e)
            )),
        }

        self.discard_partial_clone()?;
        self.git
            .clone_full(self.url, &self.target)
            .map_err(|e| Error::Clone {
                url: self.url.to_string(),
                branch: self.branch.to_string(),
                message: git_detail(&e),
            })?;
        self.strategy = Some(Strategy::FallbackClone);

        if self.git.remote_branch_exists(&self.target, ORIGIN, self.branch)? {
            self.switch_to_branch(true)?;
            return Ok(Phase::Ready);
        }

        // An empty remote clones fine but leaves nothing to check out.
        if self.git.short_head(&self.target).is_err() {
            return Err(Error::BranchNotFound {
                branch: self.branch.to_string(),
            });
        }

        let default = self
            .git
            .current_branch(&self.target)?
            .unwrap_or_else(|| "HEAD".to_string());
        self.warn(format!(
            "branch '{}' does not exist on the remote; staying on default branch '{}'",
            self.branch, default
        ));
        Ok(Phase::Ready)
    }

    fn update_existing(&mut self) -> Result<Phase> {
        self.strategy = Some(Strategy::Update);

        match self.git.remote_url(&self.target, ORIGIN)? {
            Some(current) if current == self.url => {
                self.log.record(format!("origin already points at {}", self.url));
            }
            Some(current) => {
                let from = redact_url(&current);
                self.log
                    .record(format!("correcting origin: {} -> {}", from, self.url));
                self.git
                    .set_remote_url(&self.target, ORIGIN, self.url)
                    .map_err(|e| Error::RemoteCorrection {
                        from,
                        to: self.url.to_string(),
                        stderr: git_detail(&e),
                    })?;
            }
            None => {
                self.log
                    .record(format!("origin is not configured; adding {}", self.url));
                self.git
                    .add_remote(&self.target, ORIGIN, self.url)
                    .map_err(|e| Error::RemoteCorrection {
                        from: "<none>".to_string(),
                        to: self.url.to_string(),
                        stderr: git_detail(&e),
                    })?;
            }
        }

        self.git
            .fetch_prune(&self.target, ORIGIN)
            .map_err(|e| Error::Fetch {
                url: self.url.to_string(),
                stderr: git_detail(&e),
            })?;
        Ok(Phase::BranchResolution)
    }

    fn resolve_branch(&mut self) -> Result<Phase> {
        if self.git.remote_branch_exists(&self.target, ORIGIN, self.branch)? {
            self.has_upstream = true;
            self.switch_to_branch(true)?;
        } else if self.git.local_branch_exists(&self.target, self.branch)? {
            self.has_upstream = false;
            self.log.record(format!(
                "branch '{}' exists only locally; checking it out as-is",
                self.branch
            ));
            self.switch_to_branch(false)?;
        } else {
            return Err(Error::BranchNotFound {
                branch: self.branch.to_string(),
            });
        }
        Ok(Phase::FastForward)
    }

    /// Check out the requested branch.
    ///
    /// An existing local branch is checked out plainly, without rebinding its
    /// upstream. A missing one is created tracking origin when `remote` is set.
    fn switch_to_branch(&self, remote: bool) -> Result<()> {
        let checkout_err = |e: Error| Error::Checkout {
            branch: self.branch.to_string(),
            stderr: git_detail(&e),
        };

        if self.git.current_branch(&self.target)?.as_deref() == Some(self.branch) {
            self.log
                .record(format!("branch '{}' is already checked out", self.branch));
            return Ok(());
        }

        if self.git.local_branch_exists(&self.target, self.branch)? {
            self.git
                .checkout(&self.target, self.branch)
                .map_err(checkout_err)
        } else if remote {
            self.log.record(format!(
                "creating local branch '{}' tracking {}/{}",
                self.branch, ORIGIN, self.branch
            ));
            self.git
                .checkout_tracking(&self.target, ORIGIN, self.branch)
                .map_err(checkout_err)
        } else {
            Err(Error::BranchNotFound {
                branch: self.branch.to_string(),
            })
        }
    }

    fn fast_forward(&mut self) -> Result<Phase> {
        if !self.has_upstream {
            self.warn(format!(
                "branch '{}' has no counterpart on {}; nothing to fast-forward",
                self.branch, ORIGIN
            ));
            return Ok(Phase::Ready);
        }

        let upstream = format!("refs/remotes/{}/{}", ORIGIN, self.branch);
        let pull_err = |e: Error| Error::Pull {
            branch: self.branch.to_string(),
            stderr: git_detail(&e),
        };

        if !self
            .git
            .is_ancestor(&self.target, "HEAD", &upstream)
            .map_err(pull_err)?
        {
            return Err(Error::DivergedHistory {
                branch: self.branch.to_string(),
            });
        }

        self.git
            .pull_ff_only(&self.target, ORIGIN, self.branch)
            .map_err(pull_err)?;
        Ok(Phase::Ready)
    }

    fn finish(mut self) -> SyncResult {
        if !self.target.is_dir() {
            let error = Error::PostSyncDirectoryMissing {
                path: self.target.clone(),
            };
            return self.fail(Phase::Ready, error);
        }

        let commit = match self.git.short_head(&self.target) {
            Ok(commit) => commit,
            Err(e) => {
                self.warn(format!("could not resolve the current commit: {}", git_detail(&e)));
                UNKNOWN_COMMIT.to_string()
            }
        };
        let branch = self.git.current_branch(&self.target).ok().flatten();

        self.log.record(format!(
            "ready: {} at {} ({})",
            self.target.display(),
            commit,
            branch.as_deref().unwrap_or("detached")
        ));

        SyncResult {
            final_state: FinalState::Ready,
            directory: self.target,
            branch,
            resolved_commit: Some(commit),
            strategy: self.strategy,
            warnings: self.warnings,
            error_kind: None,
            error_message: None,
            error: None,
        }
    }

    fn fail(mut self, phase: Phase, error: Error) -> SyncResult {
        self.log
            .error(format!("failed in {}: {}", phase, error));

        if self.clone_cleanup.is_some() {
            if let Err(e) = self.discard_partial_clone() {
                self.warn(format!(
                    "could not remove partial clone at {}: {}",
                    self.target.display(),
                    e
                ));
            }
        }

        SyncResult::failed(self.target, error, self.strategy, self.warnings)
    }

    /// Remove whatever a failed clone left at the target.
    fn discard_partial_clone(&self) -> Result<()> {
        let Some(cleanup) = self.clone_cleanup else {
            return Ok(());
        };
        if !self.target.exists() {
            return Ok(());
        }
        match cleanup {
            CloneCleanup::RemoveDir => fs::remove_dir_all(&self.target)?,
            CloneCleanup::ClearDir => {
                for entry in fs::read_dir(&self.target)? {
                    let path = entry?.path();
                    if path.is_dir() && !path.is_symlink() {
                        fs::remove_dir_all(&path)?;
                    } else {
                        fs::remove_file(&path)?;
                    }
                }
            }
        }
        self.log.record(format!(
            "removed partial clone at {}",
            self.target.display()
        ));
        Ok(())
    }
}

/// The part of a git failure worth showing: stderr, or the error itself.
fn git_detail(error: &Error) -> String {
    match error {
        Error::GitCommand { stderr, .. } => stderr.clone(),
        other => other.to_string(),
    }
}

/// Run one complete synchronization: acquire, sync, release.
///
/// HTTPS URLs get a credential scope that is registered with `shutdown`,
/// bound into every git command, and released before this returns,
/// whatever the outcome. Other transports run without one. The secret is
/// registered with `log` for redaction before anything is recorded.
pub fn synchronize(
    input: &InputRecord,
    target: &Path,
    log: &OperationLog,
    shutdown: &Shutdown,
) -> SyncResult {
    if let Some(secret) = input.secret() {
        log.redact(secret);
    }
    log.record(format!(
        "sync requested: {} branch '{}' into {}",
        input.repository_url(),
        input.branch(),
        target.display()
    ));

    let guard = match (input.transport().needs_secret(), input.secret(), input.host()) {
        (true, Some(secret), Some(host)) => {
            match CredentialScope::acquire(host, input.principal(), secret) {
                Ok(scope) => {
                    log.record(format!(
                        "credential scope acquired for {}@{} (secret {})",
                        input.principal(),
                        host,
                        secret.masked()
                    ));
                    Some(shutdown.protect(scope))
                }
                Err(error) => {
                    log.error(format!("{}", error));
                    return SyncResult::failed(target.to_path_buf(), error, None, Vec::new());
                }
            }
        }
        _ => None,
    };

    let overlay = guard
        .as_ref()
        .map(|scope| scope.bind())
        .unwrap_or_else(EnvironmentOverlay::non_interactive);
    let git = SystemGit::new(overlay, log).with_children(shutdown.children());
    let result = RepositorySync::new(&git, log, input.repository_url(), input.branch(), target).run();

    if let Some(guard) = guard {
        match guard.release() {
            Ok(()) => log.record("credential scope released"),
            Err(e) => log.error(format!("failed to release credential scope: {}", e)),
        }
    }
    result
}
