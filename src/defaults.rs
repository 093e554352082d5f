//! Default values for scoped-sync.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Branch synchronized when none is requested.
pub const DEFAULT_BRANCH: &str = "main";

/// Login written to the credential record when no username is supplied.
///
/// Token-based HTTPS hosts accept any non-empty login alongside the token.
pub const DEFAULT_PRINCIPAL: &str = "x-access-token";

/// Port used for the deployment hand-off when only a host is given.
pub const DEFAULT_DEPLOY_PORT: u16 = 22;

/// Prefix of the temporary credential scope directory.
pub const SCOPE_DIR_PREFIX: &str = "scoped-sync-";

/// Environment variable the access secret is read from.
pub const SECRET_ENV: &str = "SCOPED_SYNC_TOKEN";

/// Returns the default directory for operation logs.
///
/// Uses the platform state directory when there is one (`~/.local/state` on
/// Linux), the local data directory otherwise, and falls back to
/// `.scoped-sync-logs` in the current directory.
///
/// This can be overridden by the `--log-dir` CLI flag or the
/// `SCOPED_SYNC_LOG_DIR` environment variable.
pub fn default_log_dir() -> PathBuf {
    match dirs::state_dir().or_else(dirs::data_local_dir) {
        Some(dir) => dir.join("scoped-sync").join("logs"),
        None => PathBuf::from(".scoped-sync-logs"),
    }
}
