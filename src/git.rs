//! # Git Subprocess Protocol
//!
//! Every version-control operation the synchronizer performs, each mapped to
//! exactly one invocation of the system `git` binary.
//!
//! [`GitOperations`] is the seam the state machine in [`crate::sync`] talks
//! to; [`SystemGit`] is the real implementation. Tests substitute an
//! in-memory model.
//!
//! `SystemGit` applies the run's [`EnvironmentOverlay`] to every command,
//! closes stdin, and records the command line in the [`OperationLog`] before
//! running it. Command lines never carry secret material: credentials reach
//! git only through the overlay.
//!
//! With [`SystemGit::with_children`] every command is started through a
//! [`ChildRegistry`], so an interruption can terminate git and its transport
//! helpers before the credential scope goes away.
//!
//! Failures come back as [`Error::GitCommand`] with git's stderr; the state
//! machine turns them into the specific failure of the step it was in.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::credentials::EnvironmentOverlay;
use crate::error::{Error, Result};
use crate::oplog::OperationLog;
use crate::shutdown::ChildRegistry;

/// Name of the remote the synchronizer manages.
pub const ORIGIN: &str = "origin";

/// Operations the synchronizer needs from a version-control backend.
pub trait GitOperations {
    /// Depth-1 clone of a single branch into `target`.
    fn clone_shallow(&self, url: &str, branch: &str, target: &Path) -> Result<()>;

    /// Full clone of the remote's default branch into `target`.
    fn clone_full(&self, url: &str, target: &Path) -> Result<()>;

    /// Top-level directory of the work tree containing `dir`, if any.
    fn work_tree_root(&self, dir: &Path) -> Option<PathBuf>;

    /// URL of `remote`, or `None` when the remote is not configured.
    fn remote_url(&self, repo: &Path, remote: &str) -> Result<Option<String>>;

    /// Point an existing `remote` at `url`.
    fn set_remote_url(&self, repo: &Path, remote: &str, url: &str) -> Result<()>;

    /// Configure a new `remote` pointing at `url`.
    fn add_remote(&self, repo: &Path, remote: &str, url: &str) -> Result<()>;

    /// Fetch every branch of `remote`, pruning tracking refs deleted upstream.
    fn fetch_prune(&self, repo: &Path, remote: &str) -> Result<()>;

    /// Whether `refs/remotes/<remote>/<branch>` exists.
    fn remote_branch_exists(&self, repo: &Path, remote: &str, branch: &str) -> Result<bool>;

    /// Whether `refs/heads/<branch>` exists.
    fn local_branch_exists(&self, repo: &Path, branch: &str) -> Result<bool>;

    /// Name of the checked-out branch, or `None` when HEAD is detached or unborn.
    fn current_branch(&self, repo: &Path) -> Result<Option<String>>;

    /// Check out an existing local branch.
    fn checkout(&self, repo: &Path, branch: &str) -> Result<()>;

    /// Create `branch` tracking `<remote>/<branch>` and check it out.
    fn checkout_tracking(&self, repo: &Path, remote: &str, branch: &str) -> Result<()>;

    /// Whether `ancestor` is reachable from `descendant`.
    fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> Result<bool>;

    /// `git pull --ff-only <remote> <branch>`.
    fn pull_ff_only(&self, repo: &Path, remote: &str, branch: &str) -> Result<()>;

    /// Abbreviated hash of HEAD.
    fn short_head(&self, repo: &Path) -> Result<String>;
}

/// [`GitOperations`] backed by the system `git` binary.
pub struct SystemGit<'a> {
    overlay: EnvironmentOverlay,
    log: &'a OperationLog,
    children: Option<ChildRegistry>,
}

impl<'a> SystemGit<'a> {
    pub fn new(overlay: EnvironmentOverlay, log: &'a OperationLog) -> Self {
        Self {
            overlay,
            log,
            children: None,
        }
    }

    /// Start every command as a child registered in `children`.
    pub fn with_children(mut self, children: ChildRegistry) -> Self {
        self.children = Some(children);
        self
    }

    /// Whether a `git` binary can be started at all.
    pub fn available() -> bool {
        Command::new("git")
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn command(&self, repo: Option<&Path>) -> Command {
        let mut cmd = Command::new("git");
        if let Some(repo) = repo {
            cmd.arg("-C").arg(repo);
        }
        self.overlay.apply(&mut cmd);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    /// Run `cmd`, returning its output whatever the exit status.
    fn output(&self, cmd: &mut Command) -> Result<Output> {
        let display = describe(cmd);
        self.log.record(format!("run: {}", display));
        let output = match &self.children {
            Some(children) => children.output(cmd),
            None => cmd.output(),
        };
        output.map_err(|e| Error::GitCommand {
            command: display,
            stderr: e.to_string(),
        })
    }

    /// Run `cmd` and require a zero exit status.
    fn run(&self, cmd: &mut Command) -> Result<Output> {
        let output = self.output(cmd)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(Error::GitCommand {
                command: describe(cmd),
                stderr: failure_text(&output),
            })
        }
    }

    /// Run a command whose exit status answers a yes/no question.
    ///
    /// `0` is yes, `1` is no, anything else is an error.
    fn ask(&self, cmd: &mut Command) -> Result<bool> {
        let output = self.output(cmd)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Error::GitCommand {
                command: describe(cmd),
                stderr: failure_text(&output),
            }),
        }
    }
}

impl GitOperations for SystemGit<'_> {
    fn clone_shallow(&self, url: &str, branch: &str, target: &Path) -> Result<()> {
        let mut cmd = self.command(None);
        cmd.args(["clone", "--depth", "1", "--single-branch", "--branch", branch, "--"])
            .arg(url)
            .arg(target);
        self.run(&mut cmd).map(drop)
    }

    fn clone_full(&self, url: &str, target: &Path) -> Result<()> {
        let mut cmd = self.command(None);
        cmd.args(["clone", "--"]).arg(url).arg(target);
        self.run(&mut cmd).map(drop)
    }

    fn work_tree_root(&self, dir: &Path) -> Option<PathBuf> {
        let mut cmd = self.command(Some(dir));
        cmd.args(["rev-parse", "--show-toplevel"]);
        let output = self.output(&mut cmd).ok()?;
        if !output.status.success() {
            return None;
        }
        let root = stdout_text(&output);
        (!root.is_empty()).then(|| PathBuf::from(root))
    }

    fn remote_url(&self, repo: &Path, remote: &str) -> Result<Option<String>> {
        let mut cmd = self.command(Some(repo));
        cmd.args(["remote", "get-url", remote]);
        let output = self.output(&mut cmd)?;
        if output.status.success() {
            Ok(Some(stdout_text(&output)))
        } else {
            Ok(None)
        }
    }

    fn set_remote_url(&self, repo: &Path, remote: &str, url: &str) -> Result<()> {
        let mut cmd = self.command(Some(repo));
        cmd.args(["remote", "set-url", remote, url]);
        self.run(&mut cmd).map(drop)
    }

    fn add_remote(&self, repo: &Path, remote: &str, url: &str) -> Result<()> {
        let mut cmd = self.command(Some(repo));
        cmd.args(["remote", "add", remote, url]);
        self.run(&mut cmd).map(drop)
    }

    fn fetch_prune(&self, repo: &Path, remote: &str) -> Result<()> {
        let refspec = format!("+refs/heads/*:refs/remotes/{}/*", remote);
        let mut cmd = self.command(Some(repo));
        cmd.args(["fetch", "--prune", remote, refspec.as_str()]);
        self.run(&mut cmd).map(drop)
    }

    fn remote_branch_exists(&self, repo: &Path, remote: &str, branch: &str) -> Result<bool> {
        let refname = format!("refs/remotes/{}/{}", remote, branch);
        let mut cmd = self.command(Some(repo));
        cmd.args(["show-ref", "--verify", "--quiet", refname.as_str()]);
        self.ask(&mut cmd)
    }

    fn local_branch_exists(&self, repo: &Path, branch: &str) -> Result<bool> {
        let refname = format!("refs/heads/{}", branch);
        let mut cmd = self.command(Some(repo));
        cmd.args(["show-ref", "--verify", "--quiet", refname.as_str()]);
        self.ask(&mut cmd)
    }

    fn current_branch(&self, repo: &Path) -> Result<Option<String>> {
        let mut cmd = self.command(Some(repo));
        cmd.args(["symbolic-ref", "--quiet", "--short", "HEAD"]);
        let output = self.output(&mut cmd)?;
        if output.status.success() {
            Ok(Some(stdout_text(&output)))
        } else {
            Ok(None)
        }
    }

    fn checkout(&self, repo: &Path, branch: &str) -> Result<()> {
        let mut cmd = self.command(Some(repo));
        cmd.args(["checkout", branch, "--"]);
        self.run(&mut cmd).map(drop)
    }

    fn checkout_tracking(&self, repo: &Path, remote: &str, branch: &str) -> Result<()> {
        let upstream = format!("{}/{}", remote, branch);
        let mut cmd = self.command(Some(repo));
        cmd.args(["checkout", "-b", branch, "--track", upstream.as_str()]);
        self.run(&mut cmd).map(drop)
    }

    fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> Result<bool> {
        let mut cmd = self.command(Some(repo));
        cmd.args(["merge-base", "--is-ancestor", ancestor, descendant]);
        self.ask(&mut cmd)
    }

    fn pull_ff_only(&self, repo: &Path, remote: &str, branch: &str) -> Result<()> {
        let mut cmd = self.command(Some(repo));
        cmd.args(["pull", "--ff-only", remote, branch]);
        self.run(&mut cmd).map(drop)
    }

    fn short_head(&self, repo: &Path) -> Result<String> {
        let mut cmd = self.command(Some(repo));
        cmd.args(["rev-parse", "--short", "HEAD"]);
        let output = self.run(&mut cmd)?;
        Ok(stdout_text(&output))
    }
}

/// Render a command line for the operation log.
fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr
    }
}
