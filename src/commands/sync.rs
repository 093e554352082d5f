//! # Sync Command Implementation
//!
//! The `sync` subcommand: clone or update one repository into a local
//! directory.
//!
//! ## Process
//!
//! 1. **Validate**: Deployment parameters and the repository URL are checked
//!    before anything is asked for.
//! 2. **Collect the secret**: For HTTPS URLs the access token is read from
//!    `SCOPED_SYNC_TOKEN` (which is then removed from the environment) or
//!    from a hidden interactive prompt. It is never a command-line argument.
//! 3. **Synchronize**: The operation log is opened, the interruption watcher
//!    installed, and [`scoped_sync::sync::synchronize`] runs the state
//!    machine inside a credential scope.
//! 4. **Report**: A short summary, or the full result as JSON with `--json`.
//!    A failed run returns its error, which sets the exit code.

use anyhow::Result;
use clap::Args;
use console::Style;
use dialoguer::Password;
use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scoped_sync::defaults;
use scoped_sync::error::Error;
use scoped_sync::input::{DeployTarget, InputRecord, Transport};
use scoped_sync::mask::Secret;
use scoped_sync::oplog::OperationLog;
use scoped_sync::output::{OutputConfig, Painter, Stream};
use scoped_sync::shutdown::Shutdown;
use scoped_sync::sync::{synchronize, SyncResult};

/// Clone or update a repository using a temporary credential scope
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Repository URL (https://, ssh://, user@host:path, file:// or a local path)
    #[arg(long, env = "SCOPED_SYNC_REPO_URL", value_name = "URL")]
    pub repo_url: String,

    /// Branch to check out
    #[arg(long, env = "SCOPED_SYNC_BRANCH", default_value = defaults::DEFAULT_BRANCH)]
    pub branch: String,

    /// Login paired with the access token (default: x-access-token)
    #[arg(long, env = "SCOPED_SYNC_USERNAME", value_name = "NAME")]
    pub username: Option<String>,

    /// Local directory (default: derived from the repository URL)
    #[arg(long, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Directory the local directory is resolved against (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Directory for the operation log
    #[arg(long, env = "SCOPED_SYNC_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Deployment host passed through to the JSON result
    #[arg(long, value_name = "HOST")]
    pub deploy_host: Option<String>,

    /// Deployment port (1-65535, default 22)
    #[arg(long, value_name = "PORT")]
    pub deploy_port: Option<String>,

    /// Deployment key path passed through to the JSON result
    #[arg(long, value_name = "PATH")]
    pub deploy_key: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// The JSON document printed with `--json`.
#[derive(Serialize)]
struct SyncReport<'a> {
    repository_url: &'a str,
    transport: Transport,
    #[serde(flatten)]
    result: &'a SyncResult,
    log_file: Option<&'a Path>,
    deploy: Option<&'a DeployTarget>,
}

/// Execute the `sync` command.
pub fn execute(args: SyncArgs, output: &OutputConfig) -> Result<()> {
    let deploy = DeployTarget::from_parts(
        args.deploy_host.as_deref(),
        args.deploy_port.as_deref(),
        args.deploy_key.clone(),
    )?;

    let transport = Transport::of(&args.repo_url)?;
    let secret = if transport.needs_secret() {
        Some(read_secret()?)
    } else {
        None
    };
    let input = InputRecord::new(
        &args.repo_url,
        Some(&args.branch),
        args.username.as_deref(),
        secret,
    )?;
    let target = resolve_target(args.workdir.as_deref(), args.dir.as_deref(), &input)?;

    let log_dir = args.log_dir.clone().unwrap_or_else(defaults::default_log_dir);
    let log = Arc::new(OperationLog::create(&log_dir)?);
    let shutdown = Shutdown::install(log.clone());

    let result = synchronize(&input, &target, &log, &shutdown);

    if args.json {
        let report = SyncReport {
            repository_url: input.repository_url(),
            transport: input.transport(),
            result: &result,
            log_file: log.path(),
            deploy: deploy.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if result.is_ready() {
        let painter = output.painter(Stream::Stdout);
        print!("{}", render_summary(painter, &result, log.path()));
    } else {
        let painter = output.painter(Stream::Stderr);
        eprint!("{}", render_summary(painter, &result, log.path()));
    }

    result.into_result()?;
    Ok(())
}

/// Read the access token from the environment, or prompt for it.
fn read_secret() -> Result<Secret> {
    if let Some(value) = env::var_os(defaults::SECRET_ENV) {
        env::remove_var(defaults::SECRET_ENV);
        return Ok(Secret::new(value.to_string_lossy().into_owned()));
    }

    if !console::Term::stderr().is_term() {
        return Err(Error::InputAborted {
            message: format!(
                "no terminal available to prompt for the access token; set {}",
                defaults::SECRET_ENV
            ),
        }
        .into());
    }

    let value = Password::new()
        .with_prompt("Access token")
        .allow_empty_password(true)
        .interact()
        .map_err(|e| Error::InputAborted {
            message: e.to_string(),
        })?;
    Ok(Secret::new(value))
}

/// Where the checkout lives: `--dir`, or the URL-derived name, under `--workdir`.
fn resolve_target(workdir: Option<&Path>, dir: Option<&Path>, input: &InputRecord) -> Result<PathBuf> {
    let workdir = match workdir {
        Some(workdir) => workdir.to_path_buf(),
        None => env::current_dir()?,
    };
    Ok(match dir {
        Some(dir) => workdir.join(dir),
        None => workdir.join(input.local_dir_name()),
    })
}

fn render_summary(painter: Painter, result: &SyncResult, log_file: Option<&Path>) -> String {
    let mut text = String::new();

    if result.is_ready() {
        text.push_str(&format!(
            "{} {} {}\n",
            painter.marker("✅", "[OK]"),
            painter.paint(&Style::new().green().bold(), "Ready:"),
            result.directory.display()
        ));
        if let Some(branch) = &result.branch {
            text.push_str(&format!("   branch: {}\n", branch));
        }
        if let Some(commit) = &result.resolved_commit {
            text.push_str(&format!("   commit: {}\n", commit));
        }
    } else {
        text.push_str(&format!(
            "{} {} {}\n",
            painter.marker("❌", "[FAILED]"),
            painter.paint(&Style::new().red().bold(), "Failed:"),
            result.directory.display()
        ));
    }

    for warning in &result.warnings {
        text.push_str(&format!(
            "{} {}\n",
            painter.marker("⚠️ ", "[WARN]"),
            painter.paint(&Style::new().yellow(), warning)
        ));
    }

    if let Some(path) = log_file {
        text.push_str(&format!(
            "{} log: {}\n",
            painter.marker("📝", "[LOG]"),
            path.display()
        ));
    }
    text
}
