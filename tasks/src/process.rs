//! Process handle — spawns one external tool and streams its output.
//!
//! Output arrives on the event channel as whole lines: pipes deliver
//! arbitrarily sized chunks that may split mid-line, so chunks pass
//! through an accumulator and a line is only released once its
//! terminating newline has been seen. The terminal event fires exactly
//! once, and only after both the OS exit notification and the pipe
//! close notification have been observed — their relative order is
//! unspecified.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// Which output stream a line arrived on. The two streams carry no
/// ordering guarantee relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
}

/// Terminal outcome of a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Ran to completion with the given exit code.
    Exited(i32),
    /// Deliberately killed via [`ProcessHandle::kill`].
    Cancelled,
    /// The OS reported an error while waiting on the process.
    Failed(String),
}

/// Events emitted over the channel passed to [`ProcessHandle::spawn`].
#[derive(Debug)]
pub enum ProcessEvent {
    Line {
        source: OutputSource,
        line: String,
    },
    /// Fires exactly once, after all `Line` events.
    Exited(ExitOutcome),
}

/// Spawn failure. `NotFound` is distinguished from other failures so
/// callers can suggest installing the tool instead of reporting a
/// generic error.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("`{command}` not found in PATH")]
    NotFound { command: String },
    #[error("failed to spawn `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl SpawnError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Command line of a process to supervise.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl ProcessSpec {
    #[must_use]
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// One-line rendering for logs and prompts.
    #[must_use]
    pub fn display_line(&self) -> String {
        let mut line = self.command.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Append-until-newline accumulator for pipe chunks.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    /// Feed one chunk; returns every line completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.partial.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=idx).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// The unterminated tail at EOF, if any.
    pub fn finish(self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(self.partial)
        }
    }
}

/// Two-flag join for the independent "exited" and "closed" OS
/// notifications. The exit code is recorded when "exited" lands; the
/// handle resolves only once both flags are set, in either order.
#[derive(Debug, Default)]
pub(crate) struct ExitGate {
    exit_code: Option<i32>,
    closed: bool,
}

impl ExitGate {
    pub fn note_exited(&mut self, code: i32) {
        self.exit_code = Some(code);
    }

    pub fn note_closed(&mut self) {
        self.closed = true;
    }

    pub fn resolution(&self) -> Option<i32> {
        match (self.exit_code, self.closed) {
            (Some(code), true) => Some(code),
            _ => None,
        }
    }
}

/// Handle to one spawned process.
///
/// Owning the handle does not keep the process alive; dropping it
/// leaves the process running to completion (events keep flowing until
/// the receiver is dropped).
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl ProcessHandle {
    /// Spawn the process described by `spec`, delivering output lines
    /// and the terminal outcome over `event_tx`.
    ///
    /// The executable is resolved via PATH lookup first so that a
    /// missing tool fails as `SpawnError::NotFound` before anything is
    /// forked.
    pub fn spawn(
        spec: &ProcessSpec,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self, SpawnError> {
        let resolved = which::which(&spec.command).map_err(|_| SpawnError::NotFound {
            command: spec.command.clone(),
        })?;

        let mut command = Command::new(&resolved);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        set_new_session(&mut command);

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SpawnError::NotFound {
                    command: spec.command.clone(),
                }
            } else {
                SpawnError::Io {
                    command: spec.command.clone(),
                    source,
                }
            }
        })?;

        let pid = child.id().unwrap_or(0);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (kill_tx, kill_rx) = oneshot::channel();

        tracing::debug!(pid, command = %spec.display_line(), "spawned process");
        tokio::spawn(drive(child, pid, stdout, stderr, event_tx, kill_rx));

        Ok(Self {
            pid,
            kill_tx: Mutex::new(Some(kill_tx)),
        })
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Request termination of the process group.
    ///
    /// Idempotent: the second call, or a call after natural exit, is a
    /// no-op. The eventual terminal event resolves as
    /// [`ExitOutcome::Cancelled`], not a normal exit.
    pub fn kill(&self) {
        let Ok(mut slot) = self.kill_tx.lock() else {
            return;
        };
        if let Some(tx) = slot.take() {
            let _ = tx.send(());
        }
    }
}

/// Put the child in its own session so the entire process group can be
/// signalled, taking the tool's own children with it.
#[cfg(unix)]
fn set_new_session(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        command.as_std_mut().pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

fn terminate(child: &mut Child, pid: u32) {
    #[cfg(unix)]
    {
        // SIGTERM the group; the tools being supervised flush and
        // release their locks on it. Fall back to killing the direct
        // child if the group is already gone.
        unsafe {
            if libc::killpg(pid as i32, libc::SIGTERM) == -1 {
                let _ = child.start_kill();
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        let _ = child.start_kill();
    }
}

async fn read_lines<R>(mut reader: R, source: OutputSource, tx: mpsc::Sender<ProcessEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    let mut lines = LineBuffer::default();
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let chunk = String::from_utf8_lossy(&buf[..n]);
        for line in lines.push(&chunk) {
            if tx.send(ProcessEvent::Line { source, line }).await.is_err() {
                return;
            }
        }
    }
    if let Some(line) = lines.finish() {
        let _ = tx.send(ProcessEvent::Line { source, line }).await;
    }
}

async fn drive(
    mut child: Child,
    pid: u32,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    event_tx: mpsc::Sender<ProcessEvent>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    let out_task = stdout.map(|s| tokio::spawn(read_lines(s, OutputSource::Stdout, event_tx.clone())));
    let err_task = stderr.map(|s| tokio::spawn(read_lines(s, OutputSource::Stderr, event_tx.clone())));
    let readers = async move {
        if let Some(task) = out_task {
            let _ = task.await;
        }
        if let Some(task) = err_task {
            let _ = task.await;
        }
    };
    tokio::pin!(readers);

    let mut gate = ExitGate::default();
    let mut exited = false;
    let mut closed = false;
    let mut kill_seen = false;
    let mut cancelled = false;
    let mut wait_error: Option<String> = None;

    let code = loop {
        let mut kill_requested = false;
        tokio::select! {
            status = child.wait(), if !exited => {
                exited = true;
                match status {
                    Ok(status) => gate.note_exited(status.code().unwrap_or(-1)),
                    Err(e) => {
                        wait_error = Some(e.to_string());
                        gate.note_exited(-1);
                    }
                }
            }
            () = &mut readers, if !closed => {
                closed = true;
                gate.note_closed();
            }
            requested = &mut kill_rx, if !kill_seen => {
                // An Err here means the handle was dropped without a
                // kill; only an actual send counts as cancellation.
                kill_seen = true;
                if requested.is_ok() {
                    cancelled = true;
                    kill_requested = true;
                }
            }
        }
        if kill_requested {
            tracing::debug!(pid, "terminating process group");
            terminate(&mut child, pid);
        }
        if let Some(code) = gate.resolution() {
            break code;
        }
    };

    let outcome = if cancelled {
        ExitOutcome::Cancelled
    } else if let Some(error) = wait_error {
        ExitOutcome::Failed(error)
    } else {
        ExitOutcome::Exited(code)
    };
    tracing::debug!(pid, ?outcome, "process finished");
    let _ = event_tx.send(ProcessEvent::Exited(outcome)).await;
}
