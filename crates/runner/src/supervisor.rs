//! Server process supervision - spawning, readiness and termination

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::{describe_exit, RunnerError, RunnerResult};

/// How long a freshly spawned process has to stay up before it counts as ready
pub const STARTUP_PROBE: Duration = Duration::from_millis(100);

/// Default grace period between SIGTERM and SIGKILL
pub const TERMINATION_GRACE: Duration = Duration::from_millis(500);

/// Lifecycle of the supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Starting,
    Ready,
    Running,
    Terminating,
    Terminated,
    /// Failed to start, or exited while cases were running
    Failed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::NotStarted => "not started",
            ProcessState::Starting => "starting",
            ProcessState::Ready => "ready",
            ProcessState::Running => "running",
            ProcessState::Terminating => "terminating",
            ProcessState::Terminated => "terminated",
            ProcessState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Owns the server-under-test for the duration of one run.
///
/// Stdin and stdout are piped; stdin is held open and stdout is drained to
/// `trace` logs. Stderr is inherited. The child is killed if the supervisor
/// is dropped without [`ProcessSupervisor::terminate`] having run.
pub struct ProcessSupervisor {
    command: String,
    child: tokio::sync::Mutex<Option<Child>>,
    pid: Option<u32>,
    state: Mutex<ProcessState>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            command: String::new(),
            child: tokio::sync::Mutex::new(None),
            pid: None,
            state: Mutex::new(ProcessState::NotStarted),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    /// OS process id, once spawned
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn set_state(&self, next: ProcessState) {
        let mut state = self.state.lock();
        debug!(from = %*state, to = %next, "Server state change");
        *state = next;
    }

    /// Launch the server. `base_dir` anchors a relative working directory.
    pub fn start(&mut self, config: &ServerConfig, base_dir: &Path) -> RunnerResult<()> {
        let cwd = if config.cwd.is_absolute() {
            config.cwd.clone()
        } else {
            base_dir.join(&config.cwd)
        };

        info!(command = %config.command, args = ?config.args, cwd = %cwd.display(), "Spawning server");
        self.command = config.command.clone();
        self.set_state(ProcessState::Starting);

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .current_dir(&cwd)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| {
            self.set_state(ProcessState::Failed);
            RunnerError::Spawn {
                command: config.command.clone(),
                source,
            }
        })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_output(stdout));
        }

        self.pid = child.id();
        *self.child.get_mut() = Some(child);
        Ok(())
    }

    /// Wait until the server is confirmed up.
    ///
    /// Races three outcomes: the process survives [`STARTUP_PROBE`] (ready),
    /// the process exits first (`ProcessExitedEarly`), or `ready_timeout`
    /// elapses (`SpawnTimeout`).
    pub async fn await_ready(&self, ready_timeout: Duration) -> RunnerResult<()> {
        let mut guard = self.child.lock().await;
        let child = guard.as_mut().ok_or(RunnerError::NotStarted)?;

        let probe = async {
            tokio::select! {
                status = child.wait() => Err(status),
                _ = sleep(STARTUP_PROBE) => Ok(()),
            }
        };

        match timeout(ready_timeout, probe).await {
            Ok(Ok(())) => {
                info!(pid = ?self.pid, "Server is ready");
                self.set_state(ProcessState::Ready);
                Ok(())
            }
            Ok(Err(Ok(status))) => {
                self.set_state(ProcessState::Failed);
                Err(RunnerError::ProcessExitedEarly {
                    code: status.code(),
                })
            }
            Ok(Err(Err(source))) => {
                self.set_state(ProcessState::Failed);
                Err(RunnerError::Spawn {
                    command: self.command.clone(),
                    source,
                })
            }
            Err(_) => {
                self.set_state(ProcessState::Failed);
                Err(RunnerError::SpawnTimeout {
                    timeout_ms: ready_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Mark the start of case execution
    pub fn mark_running(&self) {
        self.set_state(ProcessState::Running);
    }

    /// The exit status if the process has exited, without blocking.
    ///
    /// An exit observed while cases are running moves the state to `Failed`.
    pub async fn exit_status(&self) -> Option<ExitStatus> {
        let mut guard = self.child.lock().await;
        let child = guard.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                if self.state() == ProcessState::Running {
                    warn!(pid = ?self.pid, "Server exited unexpectedly with {}", describe_exit(&status.code()));
                    self.set_state(ProcessState::Failed);
                }
                Some(status)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to poll server status");
                None
            }
        }
    }

    /// Stop the server: SIGTERM, wait up to `grace`, then SIGKILL.
    ///
    /// Never fails; problems are logged. Safe to call more than once.
    pub async fn terminate(&self, grace: Duration) {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return;
        };
        self.set_state(ProcessState::Terminating);

        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid = ?self.pid, "Server already exited with {}", describe_exit(&status.code()));
            self.set_state(ProcessState::Terminated);
            return;
        }

        info!(pid = ?self.pid, "Stopping server");
        send_terminate(&mut child);

        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid = ?self.pid, "Server stopped with {}", describe_exit(&status.code()));
            }
            Ok(Err(e)) => {
                warn!(pid = ?self.pid, error = %e, "Error waiting for server to exit");
            }
            Err(_) => {
                warn!(
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Server did not stop within grace period, killing"
                );
                if let Err(e) = child.kill().await {
                    warn!(pid = ?self.pid, error = %e, "Failed to kill server");
                }
            }
        }

        self.set_state(ProcessState::Terminated);
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the server's output until EOF, logging each line.
///
/// Bytes are logged lossily and never interpreted. Only EOF or a read error
/// ends the drain.
async fn drain_output<R: AsyncRead + Unpin>(output: R) {
    let mut reader = BufReader::new(output);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                trace!(target: "vibrissa::server", "{}", text.trim_end_matches(&['\r', '\n'][..]));
            }
            Err(e) => {
                warn!(error = %e, "Stopped reading server output");
                break;
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!(pid, error = %e, "Failed to send SIGTERM (may have already exited)");
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to stop server");
    }
}
