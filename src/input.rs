//! # Input Record
//!
//! The validated, immutable description of one synchronization run: which
//! repository, which branch, which credential, and which local directory.
//!
//! Collecting the values (flags, environment, prompts) happens in the CLI
//! layer; this module only validates them and derives what follows from them:
//!
//! - the [`Transport`] of the URL, which decides whether a credential scope
//!   is needed at all,
//! - the host the credential record is bound to,
//! - the local directory name (last URL path segment without `.git`).
//!
//! URLs that embed a password are rejected, because the URL ends up in git's
//! argument vector and in the operation log.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::defaults;
use crate::error::{Error, Result};
use crate::mask::{mask, Secret};

static SCP_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9._-]+@)?(?P<host>[A-Za-z0-9.-]+):(?P<path>[^/\\].*)$")
        .expect("scp-like URL pattern is valid")
});

static PRINCIPAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._@+-]{1,256}$").expect("principal pattern is valid"));

/// How the repository is reached, which decides how it authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// `https://`; authenticates with the embedded secret.
    Https,
    /// `ssh://` or scp-like `user@host:path`; carries no secret.
    Ssh,
    /// `file://` or a plain filesystem path; carries no secret.
    Local,
}

impl Transport {
    /// Whether runs over this transport need a credential scope.
    pub fn needs_secret(self) -> bool {
        matches!(self, Transport::Https)
    }

    /// Classify a repository URL, validating it the way [`InputRecord::new`] does.
    pub fn of(repository_url: &str) -> Result<Self> {
        parse_repository_url(repository_url.trim()).map(|parsed| parsed.transport)
    }
}

/// Downstream deployment parameters, carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployTarget {
    pub host: String,
    pub port: u16,
    pub key_path: Option<PathBuf>,
}

impl DeployTarget {
    /// Validate the optional deployment hand-off parameters.
    ///
    /// Returns `Ok(None)` when no host was given. A port or key without a
    /// host is a usage error.
    pub fn from_parts(
        host: Option<&str>,
        port: Option<&str>,
        key_path: Option<PathBuf>,
    ) -> Result<Option<Self>> {
        let host = host.map(str::trim).filter(|h| !h.is_empty());
        let Some(host) = host else {
            if port.is_some() || key_path.is_some() {
                return Err(Error::Usage {
                    message: "--deploy-port and --deploy-key require --deploy-host".to_string(),
                });
            }
            return Ok(None);
        };

        let port = match port {
            Some(value) => parse_port(value)?,
            None => defaults::DEFAULT_DEPLOY_PORT,
        };

        Ok(Some(Self {
            host: host.to_string(),
            port,
            key_path,
        }))
    }
}

/// Parse a TCP port, rejecting 0 and anything outside `u16`.
pub fn parse_port(value: &str) -> Result<u16> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(Error::InvalidPort {
            value: value.to_string(),
        }),
    }
}

/// The validated input of one run.
#[derive(Debug)]
pub struct InputRecord {
    repository_url: String,
    transport: Transport,
    host: Option<String>,
    branch: String,
    principal: Option<String>,
    secret: Option<Secret>,
    local_dir_name: String,
}

impl InputRecord {
    /// Validate the raw inputs of a run.
    ///
    /// `branch` defaults to `main`. The secret is required (and must be
    /// non-empty) for HTTPS URLs and dropped for every other transport.
    pub fn new(
        repository_url: &str,
        branch: Option<&str>,
        principal: Option<&str>,
        secret: Option<Secret>,
    ) -> Result<Self> {
        let repository_url = repository_url.trim();
        let parsed = parse_repository_url(repository_url)?;

        let principal = match principal.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Some(validate_principal(p)?),
            None => None,
        };

        let branch = branch
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(defaults::DEFAULT_BRANCH);
        validate_branch(branch)?;

        let secret = if parsed.transport.needs_secret() {
            let secret = secret.ok_or(Error::EmptySecret)?;
            let trimmed = secret.expose().trim();
            if trimmed.is_empty() {
                return Err(Error::EmptySecret);
            }
            validate_secret(trimmed)?;
            if trimmed.len() == secret.expose().len() {
                Some(secret)
            } else {
                Some(Secret::new(trimmed))
            }
        } else {
            None
        };

        Ok(Self {
            repository_url: repository_url.to_string(),
            transport: parsed.transport,
            host: parsed.host,
            branch: branch.to_string(),
            principal,
            secret,
            local_dir_name: parsed.dir_name,
        })
    }

    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Host the credential record is bound to, for network transports.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The credential principal, or the default one for token logins.
    pub fn principal(&self) -> &str {
        self.principal
            .as_deref()
            .unwrap_or(defaults::DEFAULT_PRINCIPAL)
    }

    pub fn secret(&self) -> Option<&Secret> {
        self.secret.as_ref()
    }

    /// Directory name derived from the repository URL.
    pub fn local_dir_name(&self) -> &str {
        &self.local_dir_name
    }
}

struct ParsedUrl {
    transport: Transport,
    host: Option<String>,
    dir_name: String,
}

fn invalid_url(url: &str, message: impl Into<String>) -> Error {
    Error::InvalidRepositoryUrl {
        url: redact_url(url),
        message: message.into(),
    }
}

fn parse_repository_url(raw: &str) -> Result<ParsedUrl> {
    if raw.is_empty() {
        return Err(invalid_url(raw, "the repository URL is empty"));
    }

    if raw.contains("://") {
        let url = Url::parse(raw).map_err(|e| invalid_url(raw, e.to_string()))?;
        if url.password().is_some() {
            return Err(invalid_url(
                raw,
                "credentials must not be embedded in the URL; supply the secret separately",
            ));
        }
        let transport = match url.scheme() {
            "https" => Transport::Https,
            "http" => {
                return Err(invalid_url(
                    raw,
                    "plain http would send the secret unencrypted; use https",
                ))
            }
            "ssh" | "git+ssh" | "ssh+git" => Transport::Ssh,
            "file" => Transport::Local,
            other => return Err(invalid_url(raw, format!("unsupported scheme '{}'", other))),
        };
        let host = url.host_str().map(str::to_string);
        if transport != Transport::Local && host.is_none() {
            return Err(invalid_url(raw, "the URL has no host"));
        }
        let dir_name = derive_dir_name(url.path()).ok_or_else(|| {
            invalid_url(raw, "cannot derive a directory name from the URL path")
        })?;
        return Ok(ParsedUrl {
            transport,
            host,
            dir_name,
        });
    }

    if let Some(caps) = SCP_LIKE.captures(raw) {
        // A single letter before ':' is a Windows drive, not a host.
        if caps["host"].len() > 1 {
            let dir_name = derive_dir_name(&caps["path"]).ok_or_else(|| {
                invalid_url(raw, "cannot derive a directory name from the URL path")
            })?;
            return Ok(ParsedUrl {
                transport: Transport::Ssh,
                host: Some(caps["host"].to_string()),
                dir_name,
            });
        }
    }

    let dir_name = derive_dir_name(raw)
        .ok_or_else(|| invalid_url(raw, "cannot derive a directory name from the path"))?;
    Ok(ParsedUrl {
        transport: Transport::Local,
        host: None,
        dir_name,
    })
}

/// Derive the checkout directory name from a URL path or filesystem path.
///
/// Takes the last non-empty segment and strips one trailing `.git`.
///
/// ```
/// use scoped_sync::input::derive_dir_name;
///
/// assert_eq!(derive_dir_name("/org/app.git").as_deref(), Some("app"));
/// assert_eq!(derive_dir_name("org/app/").as_deref(), Some("app"));
/// assert_eq!(derive_dir_name("/").as_deref(), None);
/// ```
pub fn derive_dir_name(path: &str) -> Option<String> {
    let segment = path
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()?;
    let name = segment.strip_suffix(".git").unwrap_or(segment);
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Replace the password component of a URL with its masked form.
///
/// Strings that do not parse as URLs are returned unchanged.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => match url.password().map(mask) {
            Some(masked) => {
                if url.set_password(Some(&masked)).is_ok() {
                    url.to_string()
                } else {
                    "<unparseable URL>".to_string()
                }
            }
            None => raw.to_string(),
        },
        Err(_) => raw.to_string(),
    }
}

// The credential record is whitespace-delimited.
fn validate_secret(secret: &str) -> Result<()> {
    if secret.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::MalformedSecret {
            reason: "it contains whitespace or control characters".to_string(),
        });
    }
    Ok(())
}

fn validate_principal(principal: &str) -> Result<String> {
    if PRINCIPAL.is_match(principal) {
        Ok(principal.to_string())
    } else {
        Err(Error::InvalidUsername {
            username: principal.to_string(),
            reason: "only letters, digits and . _ @ + - are allowed".to_string(),
        })
    }
}

/// Check a branch name against the rules git applies to ref names.
pub fn validate_branch(branch: &str) -> Result<()> {
    let reason = if branch.is_empty() {
        Some("the branch name is empty")
    } else if branch.starts_with('-') {
        Some("the branch name starts with '-'")
    } else if branch.contains("..") || branch.contains("@{") || branch.contains("//") {
        Some("the branch name contains '..', '@{' or '//'")
    } else if branch
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c))
    {
        Some("the branch name contains a character git does not allow")
    } else if branch.ends_with('/') || branch.ends_with('.') || branch.ends_with(".lock") {
        Some("the branch name ends with '/', '.' or '.lock'")
    } else if branch.starts_with('/') || branch == "@" {
        Some("the branch name is not a valid ref")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::Usage {
            message: format!("invalid branch '{}': {}", branch, reason),
        }),
        None => Ok(()),
    }
}
