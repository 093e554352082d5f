//! # Credential Scope
//!
//! Confines the access secret to a private, short-lived directory for the
//! duration of one run.
//!
//! [`CredentialScope::acquire`] creates a directory with an unpredictable
//! name (mode `0700`) and writes a single netrc record (mode `0600`) into it.
//! [`CredentialScope::bind`] returns the [`EnvironmentOverlay`] that points
//! `HOME` at that directory, so only git processes started through the
//! overlay resolve the secret, and the secret never shows up in an argument
//! vector.
//!
//! [`CredentialScope::release`] overwrites the record, removes the directory
//! and marks the scope released. It is idempotent and takes `&self`, so the
//! normal return path, `Drop`, and the interruption watcher in
//! [`crate::shutdown`] can all call it and exactly one of them does the work.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, PoisonError};

use tempfile::TempDir;

use crate::defaults::SCOPE_DIR_PREFIX;
use crate::error::{Error, Result};
use crate::mask::Secret;

/// Name of the credential record inside the scope directory.
pub const CREDENTIAL_FILE_NAME: &str = ".netrc";

/// Environment applied to every git subprocess of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentOverlay {
    vars: Vec<(String, OsString)>,
}

impl EnvironmentOverlay {
    /// The overlay used when no credential scope is involved.
    ///
    /// Interactive prompting is still disabled so a run never blocks on a
    /// terminal prompt.
    pub fn non_interactive() -> Self {
        let mut overlay = Self::default();
        overlay.set("GIT_TERMINAL_PROMPT", "0");
        overlay
    }

    fn set(&mut self, key: &str, value: impl Into<OsString>) {
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((key.to_string(), value)),
        }
    }

    #[cfg(test)]
    fn get(&self, key: &str) -> Option<&std::ffi::OsStr> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    #[cfg(test)]
    fn iter(&self) -> impl Iterator<Item = (&str, &std::ffi::OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_os_str()))
    }

    /// Apply the overlay to a command before it is spawned.
    pub fn apply(&self, cmd: &mut Command) {
        for (k, v) in &self.vars {
            cmd.env(k, v);
        }
    }
}

/// A private directory holding the credential record for one run.
#[derive(Debug)]
pub struct CredentialScope {
    dir_path: PathBuf,
    credential_file: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl CredentialScope {
    /// Create a scope under the system temporary directory.
    pub fn acquire(host: &str, principal: &str, secret: &Secret) -> Result<Self> {
        Self::acquire_in(&std::env::temp_dir(), host, principal, secret)
    }

    /// Create a scope under `parent`.
    pub fn acquire_in(parent: &Path, host: &str, principal: &str, secret: &Secret) -> Result<Self> {
        let scope_err = |what: &str, e: std::io::Error| Error::ScopeCreation {
            message: format!("{}: {}", what, e),
        };

        let dir = tempfile::Builder::new()
            .prefix(SCOPE_DIR_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| scope_err("cannot create scope directory", e))?;

        let dir_path = dir.path().to_path_buf();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir_path, fs::Permissions::from_mode(0o700))
                .map_err(|e| scope_err("cannot restrict scope directory", e))?;
        }
        let credential_file = dir_path.join(CREDENTIAL_FILE_NAME);

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let record = Secret::new(format!(
            "machine {}\nlogin {}\npassword {}\n",
            host,
            principal,
            secret.expose()
        ));
        create_record(&credential_file, &options, |file| {
            file.write_all(record.expose().as_bytes())
        })
        .map_err(|e| scope_err("cannot write credential record", e))?;
        drop(record);

        log::debug!(
            "credential scope created at {} for {}@{} ({})",
            dir_path.display(),
            principal,
            host,
            secret.masked()
        );

        Ok(Self {
            dir_path,
            credential_file,
            dir: Mutex::new(Some(dir)),
        })
    }

    /// Path of the scope directory.
    pub fn path(&self) -> &Path {
        &self.dir_path
    }

    #[cfg(test)]
    fn credential_file(&self) -> &Path {
        &self.credential_file
    }

    /// Whether [`release`](Self::release) has already run.
    pub fn is_released(&self) -> bool {
        self.dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// The environment that makes git resolve credentials from this scope.
    pub fn bind(&self) -> EnvironmentOverlay {
        let mut overlay = EnvironmentOverlay::non_interactive();
        overlay.set("HOME", self.dir_path.as_os_str());
        overlay.set("XDG_CONFIG_HOME", self.dir_path.join(".config").into_os_string());
        overlay.set("GIT_CONFIG_NOSYSTEM", "1");
        overlay.set("GIT_ASKPASS", "");
        overlay
    }

    /// Scrub the credential record and remove the scope directory.
    ///
    /// Only the first call does any work; later calls return `Ok(())`. The
    /// scope counts as released even when removal reports an error, and the
    /// error is returned so the caller can record it.
    pub fn release(&self) -> Result<()> {
        let mut guard = self.dir.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(dir) = guard.take() else {
            return Ok(());
        };

        let scrubbed = scrub_file(&self.credential_file);
        let mut removed = dir.close();
        if removed.is_err() && self.dir_path.exists() {
            removed = fs::remove_dir_all(&self.dir_path);
        }

        log::debug!("credential scope {} released", self.dir_path.display());
        scrubbed.and(removed).map_err(Error::from)
    }
}

impl Drop for CredentialScope {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!(
                "failed to release credential scope {}: {}",
                self.dir_path.display(),
                e
            );
        }
    }
}

/// Create `path` with `options` and fill it through `fill`.
///
/// A failed fill leaves the file zeroed before the error is returned.
fn create_record(
    path: &Path,
    options: &OpenOptions,
    fill: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> io::Result<()> {
    let mut file = options.open(path)?;
    let filled = fill(&mut file).and_then(|()| file.sync_all());
    if filled.is_err() {
        drop(file);
        if let Err(e) = scrub_file(path) {
            log::error!("failed to scrub partial credential record {}: {}", path.display(), e);
        }
    }
    filled
}

/// Overwrite a file's content with zeros and flush it to disk.
fn scrub_file(path: &Path) -> io::Result<()> {
    let mut file = match OpenOptions::new().write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(0))?;
    let zeros = vec![0u8; usize::try_from(len).unwrap_or(0)];
    file.write_all(&zeros)?;
    file.sync_all()
}
