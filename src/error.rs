//! # Error Handling
//!
//! This module defines the centralized error type for `scoped-sync`. It uses
//! `thiserror` to give every anticipated failure of a run its own variant,
//! with enough context (the command attempted, the branch, the directory) to
//! diagnose it from the operation log alone.
//!
//! ## Key Components
//!
//! - **`Error`**: every failure a run can end with. Messages never contain
//!   secret material; callers only ever put masked values or plain
//!   identifiers into the fields.
//! - **`ErrorKind`**: a field-less, serializable mirror of `Error` used in
//!   [`SyncResult`](crate::sync::SyncResult) and JSON output.
//! - **`Result<T>`**: alias for `std::result::Result<T, Error>`.
//!
//! Each variant maps to a distinct process exit code through
//! [`Error::exit_code`]; see [`crate::exit_codes`] for the table.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::exit_codes;

/// Main error type for scoped-sync operations
#[derive(Error, Debug)]
pub enum Error {
    /// Arguments were syntactically valid but cannot be used together.
    #[error("Usage error: {message}")]
    Usage { message: String },

    /// An interactive prompt was cancelled, or no terminal was available for it.
    #[error("Input aborted: {message}")]
    InputAborted { message: String },

    /// The access secret was empty after trimming.
    #[error("The access secret is empty")]
    EmptySecret,

    /// The access secret cannot be written into a credential record.
    #[error("The access secret is unusable: {reason}")]
    MalformedSecret { reason: String },

    /// The credential principal contains characters a credential record cannot hold.
    #[error("Invalid username '{username}': {reason}")]
    InvalidUsername { username: String, reason: String },

    /// The repository URL is malformed or embeds credentials.
    #[error("Invalid repository URL '{url}': {message}")]
    InvalidRepositoryUrl { url: String, message: String },

    /// The deployment port is not a TCP port number.
    #[error("Invalid port '{value}': expected a number between 1 and 65535")]
    InvalidPort { value: String },

    /// The temporary credential store could not be created.
    #[error("Could not create the temporary credential store: {message}")]
    ScopeCreation { message: String },

    /// The target directory exists but is not a managed checkout.
    #[error("Directory {} exists but is not a git checkout; refusing to touch it", path.display())]
    DirectoryConflict { path: PathBuf },

    /// The existing checkout could not be entered.
    #[error("Cannot enter repository directory {}: {message}", path.display())]
    RepositoryInaccessible { path: PathBuf, message: String },

    /// Rewriting the `origin` remote URL failed.
    #[error("Failed to correct origin from {from} to {to}: {stderr}")]
    RemoteCorrection {
        from: String,
        to: String,
        stderr: String,
    },

    /// Fetching from `origin` failed.
    #[error("Fetch from {url} failed: {stderr}")]
    Fetch { url: String, stderr: String },

    /// Checking out the requested branch failed.
    #[error("Checkout of branch '{branch}' failed: {stderr}")]
    Checkout { branch: String, stderr: String },

    /// The branch exists neither on the remote nor locally.
    #[error("Branch '{branch}' exists neither on the remote nor locally")]
    BranchNotFound { branch: String },

    /// The local branch has commits that are not present upstream.
    #[error("Local branch '{branch}' has diverged from origin/{branch}; refusing to merge or reset")]
    DivergedHistory { branch: String },

    /// The fast-forward pull failed for a reason other than divergence.
    #[error("Fast-forward pull of branch '{branch}' failed: {stderr}")]
    Pull { branch: String, stderr: String },

    /// Both the shallow clone and the full fallback clone failed.
    #[error("Git clone error for {url}@{branch}: {message}")]
    Clone {
        url: String,
        branch: String,
        message: String,
    },

    /// The checkout directory was missing once synchronization finished.
    #[error("Repository directory {} is missing after synchronization", path.display())]
    PostSyncDirectoryMissing { path: PathBuf },

    /// A git subprocess could not be started or failed unexpectedly.
    #[error("Git command failed: {command} - {stderr}")]
    GitCommand { command: String, stderr: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Field-less classification of [`Error`], stable enough to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Usage,
    InputAborted,
    EmptySecret,
    InvalidUsername,
    InvalidRepositoryUrl,
    InvalidPort,
    ScopeCreationError,
    DirectoryConflict,
    RepositoryInaccessible,
    RemoteCorrectionFailure,
    FetchFailure,
    CheckoutFailure,
    BranchNotFound,
    DivergedHistory,
    PullFailure,
    CloneFailure,
    PostSyncDirectoryMissing,
    GitCommand,
    Io,
}

impl Error {
    /// The classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Usage { .. } => ErrorKind::Usage,
            Error::InputAborted { .. } => ErrorKind::InputAborted,
            Error::EmptySecret | Error::MalformedSecret { .. } => ErrorKind::EmptySecret,
            Error::InvalidUsername { .. } => ErrorKind::InvalidUsername,
            Error::InvalidRepositoryUrl { .. } => ErrorKind::InvalidRepositoryUrl,
            Error::InvalidPort { .. } => ErrorKind::InvalidPort,
            Error::ScopeCreation { .. } => ErrorKind::ScopeCreationError,
            Error::DirectoryConflict { .. } => ErrorKind::DirectoryConflict,
            Error::RepositoryInaccessible { .. } => ErrorKind::RepositoryInaccessible,
            Error::RemoteCorrection { .. } => ErrorKind::RemoteCorrectionFailure,
            Error::Fetch { .. } => ErrorKind::FetchFailure,
            Error::Checkout { .. } => ErrorKind::CheckoutFailure,
            Error::BranchNotFound { .. } => ErrorKind::BranchNotFound,
            Error::DivergedHistory { .. } => ErrorKind::DivergedHistory,
            Error::Pull { .. } => ErrorKind::PullFailure,
            Error::Clone { .. } => ErrorKind::CloneFailure,
            Error::PostSyncDirectoryMissing { .. } => ErrorKind::PostSyncDirectoryMissing,
            Error::GitCommand { .. } => ErrorKind::GitCommand,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// The process exit code a run ending with this error reports.
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

impl ErrorKind {
    /// The process exit code for this kind of failure.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Usage => exit_codes::USAGE,
            ErrorKind::InputAborted => exit_codes::INPUT_ABORTED,
            ErrorKind::EmptySecret => exit_codes::EMPTY_SECRET,
            ErrorKind::InvalidUsername => exit_codes::INVALID_USERNAME,
            ErrorKind::InvalidRepositoryUrl => exit_codes::INVALID_REPOSITORY_URL,
            ErrorKind::InvalidPort => exit_codes::INVALID_PORT,
            ErrorKind::ScopeCreationError => exit_codes::SCOPE_CREATION,
            ErrorKind::DirectoryConflict => exit_codes::DIRECTORY_CONFLICT,
            ErrorKind::RepositoryInaccessible => exit_codes::REPOSITORY_INACCESSIBLE,
            ErrorKind::RemoteCorrectionFailure => exit_codes::SET_ORIGIN,
            ErrorKind::FetchFailure => exit_codes::FETCH,
            ErrorKind::CheckoutFailure => exit_codes::CHECKOUT,
            ErrorKind::BranchNotFound => exit_codes::BRANCH_NOT_FOUND,
            ErrorKind::DivergedHistory => exit_codes::DIVERGED_HISTORY,
            ErrorKind::PullFailure => exit_codes::PULL,
            ErrorKind::CloneFailure => exit_codes::CLONE,
            ErrorKind::PostSyncDirectoryMissing => exit_codes::POST_SYNC_DIRECTORY_MISSING,
            ErrorKind::GitCommand | ErrorKind::Io => exit_codes::GENERAL_ERROR,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
