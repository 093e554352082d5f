//! # Scoped Sync Library
//!
//! Keeps a local git checkout in line with one branch of a remote repository
//! while the access token used for it lives only as long as the run. It backs
//! the `scoped-sync` command-line tool and can be embedded directly.
//!
//! ## Quick Example
//!
//! ```no_run
//! use scoped_sync::input::InputRecord;
//! use scoped_sync::mask::Secret;
//! use scoped_sync::oplog::OperationLog;
//! use scoped_sync::shutdown::Shutdown;
//! use scoped_sync::sync::synchronize;
//! use std::path::Path;
//!
//! let input = InputRecord::new(
//!     "https://example.com/org/app.git",
//!     Some("main"),
//!     None,
//!     Some(Secret::new("ghp_example_token")),
//! )
//! .unwrap();
//! let log = OperationLog::create(Path::new("/var/log/scoped-sync")).unwrap();
//! let result = synchronize(&input, Path::new("/srv/app"), &log, &Shutdown::inert());
//! println!("{:?} at {:?}", result.final_state, result.resolved_commit);
//! ```
//!
//! ## Core Concepts
//!
//! - **Input (`input`)**: The validated repository URL, branch, principal and
//!   secret, and the local directory name derived from the URL.
//! - **Masking (`mask`)**: The only way a secret is ever rendered.
//! - **Credential scope (`credentials`)**: A private temporary directory
//!   holding a netrc record, and the environment overlay that points git at
//!   it. Released exactly once, on every exit path.
//! - **Interruption (`shutdown`)**: Terminates running git subprocesses and
//!   releases registered scopes when the process receives SIGINT, SIGTERM
//!   or SIGHUP.
//! - **Synchronization (`sync`, `git`)**: The state machine that clones or
//!   updates the checkout, fast-forward only, through the `git` binary.
//! - **Operation log (`oplog`)**: Timestamped, append-only record of a run.
//!
//! ## Execution Flow
//!
//! 1. **Validate** the input; nothing touches the filesystem before this.
//! 2. **Acquire** a credential scope for HTTPS URLs and register it for
//!    release on interruption.
//! 3. **Synchronize**: detect the repository state, then clone, or correct
//!    origin, fetch, resolve the branch and fast-forward.
//! 4. **Release** the scope and report a [`sync::SyncResult`].

pub mod credentials;
pub mod defaults;
pub mod error;
pub mod exit_codes;
pub mod git;
pub mod input;
pub mod mask;
pub mod oplog;
pub mod output;
pub mod shutdown;
pub mod sync;
