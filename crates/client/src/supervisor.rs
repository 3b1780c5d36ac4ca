//! Worker process lifecycle: spawn with redirected stdio, graceful-then-forced stop.

use std::collections::HashMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::drain::LogDrain;
use crate::error::{Error, Result};
use crate::pipe;

/// How long a worker gets to exit after `SIGTERM` before `SIGKILL`.
pub const GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Command line for a worker process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl ServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// A spawned worker and the controlling side's ends of its three pipes.
///
/// Streams are optional so they can be closed independently and more than
/// once.
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<LogDrain>,
}

impl ProcessHandle {
    fn spawn(config: &ServerConfig) -> io::Result<Self> {
        let (stderr_read, stderr_write) = pipe::pipe()?;

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(stderr_write))
            // Destructor-equivalent cleanup when a handle is dropped unstopped.
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        // Closes our copy of the stderr write end; the child holds the only one.
        drop(command);

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.start_kill();
            return Err(io::Error::other("failed to capture worker stdio"));
        };

        Ok(Self {
            pid: child.id(),
            child,
            stdin: Some(stdin),
            stdout: Some(BufReader::new(stdout)),
            stderr: Some(LogDrain::new(stderr_read)),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The three streams at once, for callers that use them together.
    pub(crate) fn streams(
        &mut self,
    ) -> (
        Option<&mut ChildStdin>,
        Option<&mut BufReader<ChildStdout>>,
        Option<&mut LogDrain>,
    ) {
        (
            self.stdin.as_mut(),
            self.stdout.as_mut(),
            self.stderr.as_mut(),
        )
    }

    pub(crate) fn stderr(&mut self) -> Option<&mut LogDrain> {
        self.stderr.as_mut()
    }

    fn close_streams(&mut self) {
        self.stdin.take();
        self.stdout.take();
        self.stderr.take();
    }

    /// `SIGTERM`, wait up to [`GRACE_PERIOD`], then `SIGKILL` and reap.
    async fn terminate(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to poll worker status"),
        }

        if let Some(pid) = self.pid {
            send_signal(pid, Signal::SIGTERM);
        }
        match timeout(GRACE_PERIOD, self.child.wait()).await {
            Ok(Ok(status)) => return Some(status),
            Ok(Err(e)) => warn!(error = %e, "failed waiting for worker after SIGTERM"),
            Err(_) => debug!(pid = ?self.pid, "worker ignored SIGTERM, killing"),
        }

        // Already-exited children make start_kill fail; wait still reaps them.
        let _ = self.child.start_kill();
        match self.child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "failed to reap worker");
                None
            }
        }
    }
}

fn send_signal(pid: u32, signal: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    // The pid belongs to our unreaped child, so it cannot have been reused.
    if let Err(e) = kill(Pid::from_raw(raw), signal) {
        debug!(pid, ?signal, error = %e, "kill failed");
    }
}

/// Owns at most one worker process at a time.
///
/// `is_running` reports the supervisor's own bookkeeping, not a liveness
/// check: a worker that crashed on its own still reads as running until
/// [`stop`](Self::stop) is called or a request fails.
#[derive(Default)]
pub struct ProcessSupervisor {
    handle: Option<ProcessHandle>,
    running: bool,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the worker with stdin, stdout and stderr redirected to pipes.
    pub fn start(&mut self, config: &ServerConfig) -> Result<()> {
        if self.running {
            return Err(Error::AlreadyRunning);
        }

        let handle = ProcessHandle::spawn(config).map_err(Error::Spawn)?;
        info!(pid = ?handle.pid(), command = %config.command, "worker started");

        self.handle = Some(handle);
        self.running = true;
        Ok(())
    }

    /// Close all streams and make sure the worker is gone. Idempotent.
    ///
    /// Returns the exit status when this call reaped the process.
    pub async fn stop(&mut self) -> Option<ExitStatus> {
        self.running = false;
        let mut handle = self.handle.take()?;

        handle.close_streams();
        let status = handle.terminate().await;
        info!(pid = ?handle.pid(), status = ?status, "worker stopped");
        status
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(ProcessHandle::pid)
    }

    pub fn handle_mut(&mut self) -> Option<&mut ProcessHandle> {
        self.handle.as_mut()
    }

    /// Whatever the worker has written to stderr so far. Never blocks.
    pub fn drain_logs(&mut self) -> io::Result<String> {
        match self.handle.as_mut().and_then(ProcessHandle::stderr) {
            Some(drain) => drain.drain(),
            None => Ok(String::new()),
        }
    }

    /// Re-emit available worker stderr lines through `tracing`. Never blocks.
    pub fn forward_logs(&mut self) -> io::Result<usize> {
        match self.handle.as_mut().and_then(ProcessHandle::stderr) {
            Some(drain) => drain.forward(),
            None => Ok(0),
        }
    }
}
