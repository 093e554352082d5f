//! # Inspect Command Implementation
//!
//! Reports what `sync` would find at a directory: absent, a managed checkout,
//! or something it refuses to touch. For a managed checkout it also shows the
//! origin URL (with any embedded password masked), the current branch and
//! the short HEAD hash.
//!
//! Nothing is modified and no credential scope is created.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use scoped_sync::credentials::EnvironmentOverlay;
use scoped_sync::git::{GitOperations, SystemGit, ORIGIN};
use scoped_sync::input::redact_url;
use scoped_sync::oplog::OperationLog;
use scoped_sync::output::{OutputConfig, Painter, Stream};
use scoped_sync::sync::RepositoryState;

/// Report the state of a local directory without changing it
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Directory to inspect
    #[arg(value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Inspection {
    directory: PathBuf,
    state: RepositoryState,
    origin: Option<String>,
    branch: Option<String>,
    head: Option<String>,
}

/// Execute the `inspect` command.
pub fn execute(args: InspectArgs, output: &OutputConfig) -> Result<()> {
    let log = OperationLog::in_memory();
    let git = SystemGit::new(EnvironmentOverlay::non_interactive(), &log);
    let report = inspect(&git, &args.dir)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(output.painter(Stream::Stdout), &report));
    }
    Ok(())
}

fn inspect<G: GitOperations + ?Sized>(git: &G, dir: &Path) -> Result<Inspection> {
    let state = RepositoryState::detect(git, dir)?;
    let mut report = Inspection {
        directory: dir.to_path_buf(),
        state,
        origin: None,
        branch: None,
        head: None,
    };

    if state == RepositoryState::PresentManaged {
        report.origin = git.remote_url(dir, ORIGIN)?.map(|url| redact_url(&url));
        report.branch = git.current_branch(dir)?;
        report.head = git.short_head(dir).ok();
    }
    Ok(report)
}

fn render(painter: Painter, report: &Inspection) -> String {
    let state = match report.state {
        RepositoryState::Absent => "absent (sync will clone)",
        RepositoryState::PresentManaged => "managed checkout (sync will update)",
        RepositoryState::PresentUnmanaged => "not a checkout (sync will refuse)",
    };
    let mut text = format!(
        "{} {}: {}\n",
        painter.marker("🔎", "[INSPECT]"),
        report.directory.display(),
        state
    );
    let fields = [
        ("origin", &report.origin),
        ("branch", &report.branch),
        ("head", &report.head),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            text.push_str(&format!("   {}: {}\n", name, value));
        }
    }
    text
}
