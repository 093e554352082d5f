//! # Exit Codes
//!
//! Process exit codes returned by the `scoped-sync` binary. Every failure
//! the synchronizer can report has its own code so that a calling script can
//! tell outcomes apart without parsing text.
//!
//! - `0` success
//! - `1` unexpected error
//! - `2` invalid command-line usage (also what clap uses)
//! - `3..=7` input problems
//! - `10..=20` credential scope and repository synchronization failures
//! - `128 + signo` interrupted by a signal, after the credential scope was
//!   released

/// The run completed and the checkout is ready.
pub const SUCCESS: i32 = 0;
/// Any error that has no dedicated code.
pub const GENERAL_ERROR: i32 = 1;
/// Invalid command-line usage.
pub const USAGE: i32 = 2;
/// The user cancelled an interactive prompt, or no terminal was available.
pub const INPUT_ABORTED: i32 = 3;
/// The access secret was empty or unusable.
pub const EMPTY_SECRET: i32 = 4;
/// The credential principal was rejected.
pub const INVALID_USERNAME: i32 = 5;
/// The repository URL could not be used.
pub const INVALID_REPOSITORY_URL: i32 = 6;
/// The deployment port was not a valid TCP port.
pub const INVALID_PORT: i32 = 7;

/// The temporary credential store could not be created.
pub const SCOPE_CREATION: i32 = 10;
/// The existing checkout could not be entered.
pub const REPOSITORY_INACCESSIBLE: i32 = 11;
/// Rewriting the `origin` remote failed.
pub const SET_ORIGIN: i32 = 12;
/// Fetching from `origin` failed.
pub const FETCH: i32 = 13;
/// Checking out the requested branch failed.
pub const CHECKOUT: i32 = 14;
/// The fast-forward pull failed for a reason other than divergence.
pub const PULL: i32 = 15;
/// The local branch has commits that are not upstream.
pub const DIVERGED_HISTORY: i32 = 16;
/// Both the shallow clone and the full fallback clone failed.
pub const CLONE: i32 = 17;
/// The branch exists neither on the remote nor locally.
pub const BRANCH_NOT_FOUND: i32 = 18;
/// The checkout directory disappeared after synchronization.
pub const POST_SYNC_DIRECTORY_MISSING: i32 = 19;
/// The target directory exists but is not a managed checkout.
pub const DIRECTORY_CONFLICT: i32 = 20;

/// Exit code used after being interrupted by signal `signo`.
pub const fn interrupted(signo: i32) -> i32 {
    128 + signo
}
