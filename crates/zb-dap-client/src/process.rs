use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How to start one debug adapter subprocess.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub grace_period: Duration,
}

impl LaunchConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let label = program
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "adapter".to_string());
        Self {
            label,
            program,
            args: Vec::new(),
            cwd: None,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
    }
}

/// Pipes of a freshly spawned adapter.
pub struct AdapterPipes {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

#[derive(Debug)]
struct Shared {
    child: Mutex<Child>,
    killed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Child> {
        match self.child.lock() {
            Ok(child) => child,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A running debug adapter subprocess.
#[derive(Debug)]
pub struct AdapterProcess {
    shared: Arc<Shared>,
    pid: u32,
    program: PathBuf,
}

impl AdapterProcess {
    pub fn spawn(launch: &LaunchConfig) -> Result<(Self, AdapterPipes)> {
        let mut child = launch.command().spawn().map_err(|source| ClientError::Spawn {
            program: launch.program.display().to_string(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(ClientError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(ClientError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ClientError::MissingPipe("stderr"))?;
        let pid = child.id();

        info!(pid, program = %launch.program.display(), args = ?launch.args, "Spawned debug adapter");

        Ok((
            Self {
                shared: Arc::new(Shared {
                    child: Mutex::new(child),
                    killed: AtomicBool::new(false),
                }),
                pid,
                program: launch.program.clone(),
            },
            AdapterPipes {
                stdin,
                stdout,
                stderr,
            },
        ))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// True while the subprocess has not exited.
    pub fn is_running(&self) -> bool {
        matches!(self.shared.lock().try_wait(), Ok(None))
    }

    /// Polls until the subprocess exits by itself or `timeout` passes.
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let status = self.shared.lock().try_wait();
            match status {
                Ok(Some(_)) => return true,
                Ok(None) if before(deadline) => thread::sleep(EXIT_POLL_INTERVAL),
                _ => return false,
            }
        }
    }

    pub fn kill_switch(&self) -> KillSwitch {
        KillSwitch {
            shared: Arc::downgrade(&self.shared),
            pid: self.pid,
        }
    }

    /// Asks the subprocess to exit, waits up to `grace_period`, then kills it.
    ///
    /// Never fails; whatever happened is described by the returned report.
    pub fn terminate(&self, grace_period: Duration) -> ExitReport {
        let mut child = self.shared.lock();

        match child.try_wait() {
            Ok(Some(status)) => {
                let killed = self.shared.killed.load(Ordering::Acquire);
                debug!(pid = self.pid, %status, "Debug adapter had already exited");
                return ExitReport {
                    status: Some(status),
                    exited_on_its_own: !killed,
                    forced: killed,
                };
            }
            Ok(None) => {}
            Err(e) => warn!(pid = self.pid, error = %e, "Failed to poll debug adapter"),
        }

        if let Err(e) = signal_terminate(&mut child) {
            warn!(pid = self.pid, error = %e, "Failed to signal debug adapter");
        }

        let deadline = Instant::now().checked_add(grace_period);
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(pid = self.pid, %status, "Debug adapter exited");
                    return ExitReport {
                        status: Some(status),
                        exited_on_its_own: false,
                        forced: self.shared.killed.load(Ordering::Acquire),
                    };
                }
                Ok(None) if before(deadline) => thread::sleep(EXIT_POLL_INTERVAL),
                Ok(None) => break,
                Err(e) => {
                    warn!(pid = self.pid, error = %e, "Failed to poll debug adapter");
                    break;
                }
            }
        }

        warn!(
            pid = self.pid,
            grace_ms = grace_period.as_millis() as u64,
            "Debug adapter ignored termination request, killing it"
        );
        if let Err(e) = child.kill() {
            warn!(pid = self.pid, error = %e, "Failed to kill debug adapter");
        }
        let status = match child.wait() {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(pid = self.pid, error = %e, "Failed to reap debug adapter");
                None
            }
        };
        ExitReport {
            status,
            exited_on_its_own: false,
            forced: true,
        }
    }
}

/// True while `deadline` lies ahead. `None` stands for a deadline too far out to represent.
fn before(deadline: Option<Instant>) -> bool {
    deadline.is_none_or(|deadline| Instant::now() < deadline)
}

#[cfg(unix)]
fn signal_terminate(child: &mut Child) -> io::Result<()> {
    let pid = child.id() as libc::pid_t;
    // SAFETY: the pid belongs to a child that has not been reaped yet (we hold its lock).
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn signal_terminate(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Forcibly kills an adapter from another thread, e.g. when a scenario overruns its deadline.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    shared: Weak<Shared>,
    pid: u32,
}

impl KillSwitch {
    /// Returns false if the process was already gone.
    pub fn trigger(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        shared.killed.store(true, Ordering::Release);
        let mut child = shared.lock();
        match child.kill() {
            Ok(()) => {
                warn!(pid = self.pid, "Killed debug adapter");
                true
            }
            Err(e) => {
                debug!(pid = self.pid, error = %e, "Debug adapter was not running");
                false
            }
        }
    }
}

/// What happened to the adapter subprocess at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit status, if the process was reaped.
    pub status: Option<ExitStatus>,
    /// The process had exited before the harness asked it to.
    pub exited_on_its_own: bool,
    /// The process had to be killed.
    pub forced: bool,
}

impl ExitReport {
    /// Report for a session that was not backed by a subprocess.
    pub fn detached() -> Self {
        Self {
            status: None,
            exited_on_its_own: false,
            forced: false,
        }
    }

    /// The adapter died by itself with a failure status.
    pub fn is_unexpected_failure(&self) -> bool {
        self.exited_on_its_own && self.status.is_some_and(|status| !status.success())
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.exited_on_its_own, self.forced) {
            (None, _, true) => write!(f, "killed, exit status unknown"),
            (None, _, false) => write!(f, "no subprocess"),
            (Some(status), true, _) => write!(f, "exited on its own ({})", status),
            (Some(status), false, true) => write!(f, "killed ({})", status),
            (Some(status), false, false) => write!(f, "terminated ({})", status),
        }
    }
}
