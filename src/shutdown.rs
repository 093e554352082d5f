//! Releasing credential scopes when the process is interrupted.
//!
//! `Drop` covers normal returns, early `?` returns and panics, but a signal
//! that terminates the process runs no destructors. [`Shutdown::install`]
//! starts a watcher thread that waits for SIGINT, SIGTERM or SIGHUP on a
//! current-thread tokio runtime. When one arrives it records the
//! interruption, releases every registered scope and exits with `128 + signo`.
//!
//! Scopes are registered through [`Shutdown::protect`], which returns a
//! [`ScopeGuard`]. The guard and the watcher share the scope; whichever calls
//! [`CredentialScope::release`] first does the work and the other waits on the
//! scope's lock, so the process never exits halfway through a release.
//!
//! Subprocesses that may hold the secret are started through
//! [`ChildRegistry::output`]. On unix each one leads its own process group.
//! Before releasing scopes the watcher sends SIGTERM to every registered
//! group, which lets `git clone` remove its partial work tree, and waits for
//! the children to be reaped. Groups still alive after
//! [`CHILD_EXIT_TIMEOUT`] get SIGKILL.

use std::io;
use std::ops::Deref;
use std::process::{Command, Output};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::credentials::CredentialScope;
use crate::error::Result;
use crate::exit_codes;
use crate::oplog::OperationLog;

type Registry = Arc<Mutex<Vec<Arc<CredentialScope>>>>;

/// How long the watcher waits for signalled children before killing them.
pub const CHILD_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interruption watcher and the scopes and subprocesses it protects.
pub struct Shutdown {
    registry: Registry,
    children: ChildRegistry,
}

impl Shutdown {
    /// Start watching for termination signals.
    ///
    /// Signal handlers are registered before this returns. If they cannot be
    /// registered the failure is logged and scopes are still released by
    /// their guards on every non-signal exit path.
    pub fn install(log: Arc<OperationLog>) -> Self {
        let registry = Registry::default();
        let children = ChildRegistry::default();
        if let Err(e) = spawn_watcher(registry.clone(), children.clone(), log.clone()) {
            log.warn(format!("could not install signal handlers: {}", e));
        }
        Self { registry, children }
    }

    /// A registry without a watcher, for library callers that handle signals
    /// themselves.
    pub fn inert() -> Self {
        Self {
            registry: Registry::default(),
            children: ChildRegistry::default(),
        }
    }

    /// Registry the watcher terminates subprocesses through.
    pub fn children(&self) -> ChildRegistry {
        self.children.clone()
    }

    /// Register `scope` for release on interruption.
    pub fn protect(&self, scope: CredentialScope) -> ScopeGuard {
        let scope = Arc::new(scope);
        lock(&self.registry).push(scope.clone());
        ScopeGuard {
            scope,
            registry: self.registry.clone(),
        }
    }

    #[cfg(test)]
    fn protected_count(&self) -> usize {
        lock(&self.registry).len()
    }
}

/// Owning handle to a registered scope. Releases and unregisters on drop.
pub struct ScopeGuard {
    scope: Arc<CredentialScope>,
    registry: Registry,
}

impl ScopeGuard {
    /// Release the scope now. Later releases, including the one on drop, are no-ops.
    pub fn release(&self) -> Result<()> {
        self.scope.release()
    }
}

impl Deref for ScopeGuard {
    type Target = CredentialScope;

    fn deref(&self) -> &CredentialScope {
        &self.scope
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.scope.release() {
            log::error!(
                "failed to release credential scope {}: {}",
                self.scope.path().display(),
                e
            );
        }
        lock(&self.registry).retain(|s| !Arc::ptr_eq(s, &self.scope));
    }
}

fn lock(registry: &Registry) -> MutexGuard<'_, Vec<Arc<CredentialScope>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Children {
    pids: Vec<u32>,
    closed: bool,
}

/// Running subprocesses the watcher terminates on interruption.
#[derive(Clone, Default)]
pub struct ChildRegistry {
    inner: Arc<Mutex<Children>>,
}

impl ChildRegistry {
    /// Run `cmd` to completion as a registered child, collecting its output.
    ///
    /// Once the watcher has started terminating children the calling thread
    /// never returns from here: no new process is started, and a thread whose
    /// child was just terminated parks until the watcher exits the process.
    pub fn output(&self, cmd: &mut Command) -> io::Result<Output> {
        let child = {
            let mut children = self.lock();
            if children.closed {
                drop(children);
                park_forever();
            }
            isolate(cmd);
            let child = cmd.spawn()?;
            children.pids.push(child.id());
            child
        };
        let pid = child.id();
        let output = child.wait_with_output();

        let closed = {
            let mut children = self.lock();
            children.pids.retain(|p| *p != pid);
            children.closed
        };
        if closed {
            park_forever();
        }
        output
    }

    fn lock(&self) -> MutexGuard<'_, Children> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn running(&self) -> Vec<u32> {
        self.lock().pids.clone()
    }

    /// Stop accepting children, signal the running ones and wait for them.
    fn terminate_all(&self, log: &OperationLog, timeout: Duration) {
        let pids = {
            let mut children = self.lock();
            children.closed = true;
            children.pids.clone()
        };
        if pids.is_empty() {
            return;
        }
        for pid in &pids {
            log.record(format!("terminating subprocess group {}", pid));
            if let Err(e) = signal_group(*pid, "TERM") {
                log.error(format!("could not signal subprocess group {}: {}", pid, e));
            }
        }

        let deadline = Instant::now() + timeout;
        while !self.running().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        for pid in self.running() {
            log.error(format!("subprocess group {} did not exit; killing it", pid));
            if let Err(e) = signal_group(pid, "KILL") {
                log.error(format!("could not kill subprocess group {}: {}", pid, e));
            }
        }
    }
}

fn park_forever() -> ! {
    loop {
        thread::park();
    }
}

#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

/// Send `signal` to the process group led by `pid`.
#[cfg(unix)]
fn signal_group(pid: u32, signal: &str) -> io::Result<()> {
    let status = Command::new("kill")
        .args(["-s", signal, "--", &format!("-{}", pid)])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("kill exited with {}", status)))
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: &str) -> io::Result<()> {
    Ok(())
}

fn release_all(registry: &Registry, log: &OperationLog) {
    for scope in lock(registry).iter() {
        match scope.release() {
            Ok(()) => log.record(format!(
                "credential scope {} released",
                scope.path().display()
            )),
            Err(e) => log.error(format!(
                "failed to release credential scope {}: {}",
                scope.path().display(),
                e
            )),
        }
    }
}

fn spawn_watcher(
    registry: Registry,
    children: ChildRegistry,
    log: Arc<OperationLog>,
) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let signals = {
        let _guard = runtime.enter();
        Signals::register()?
    };

    thread::Builder::new()
        .name("scoped-sync-signals".to_string())
        .spawn(move || {
            let (signo, name) = runtime.block_on(signals.recv());
            log.error(format!("received {}; releasing credentials before exit", name));
            children.terminate_all(&log, CHILD_EXIT_TIMEOUT);
            release_all(&registry, &log);
            std::process::exit(exit_codes::interrupted(signo));
        })?;
    Ok(())
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    const SIGHUP: i32 = 1;
    const SIGINT: i32 = 2;
    const SIGTERM: i32 = 15;

    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn recv(mut self) -> (i32, &'static str) {
        tokio::select! {
            _ = self.interrupt.recv() => (Self::SIGINT, "SIGINT"),
            _ = self.terminate.recv() => (Self::SIGTERM, "SIGTERM"),
            _ = self.hangup.recv() => (Self::SIGHUP, "SIGHUP"),
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    const SIGINT: i32 = 2;

    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> (i32, &'static str) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => (Self::SIGINT, "Ctrl-C"),
            Err(_) => std::future::pending().await,
        }
    }
}
