//! Completion daemon process ownership and request/response matching.
//!
//! One actor task owns the child process; the cloneable [`Daemon`]
//! handle talks to it over a command channel. The wire protocol has no
//! request ids, so replies are matched to requests strictly in
//! submission order — callers must not issue a second request before
//! the previous one resolves.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};

use crate::protocol;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Liveness of the daemon process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Starting,
    Running,
    /// Died unexpectedly; a relaunch is pending.
    Crashed,
    /// The executable does not exist. Terminal — no relaunch.
    NotFound,
    /// Explicitly stopped; revived only by [`Daemon::restart`].
    Stopped,
}

/// Launch configuration for the daemon.
#[derive(Debug, Clone)]
pub struct DaemonSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Delay between an unexpected exit and the relaunch.
    pub restart_delay: Duration,
}

impl DaemonSpec {
    #[must_use]
    pub fn from_config(config: &gantry_config::Config) -> Self {
        let tool = &config.tools.daemon;
        Self {
            command: tool.command.clone(),
            args: tool.args.clone(),
            env: tool.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            restart_delay: Duration::from_millis(config.daemon_restart_delay_ms),
        }
    }
}

#[derive(Debug)]
enum DaemonCommand {
    Request {
        line: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    Restart,
    Stop,
}

/// Handle to the daemon actor. Clones address the same process.
#[derive(Debug, Clone)]
pub struct Daemon {
    cmd_tx: mpsc::Sender<DaemonCommand>,
    status_rx: watch::Receiver<DaemonStatus>,
}

impl Daemon {
    /// Launch the actor; the child process is spawned immediately and
    /// the handle is usable at once.
    #[must_use]
    pub fn start(spec: DaemonSpec) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(DaemonStatus::Starting);
        tokio::spawn(run_daemon(spec, cmd_rx, status_tx));
        Self { cmd_tx, status_rx }
    }

    /// Send one request line and await the response body (the lines up
    /// to, excluding, the sentinel). Resolves with an empty result if
    /// the daemon is down — a request never hangs past a crash.
    pub async fn request(&self, command: &str, args: &[&str]) -> Vec<String> {
        let line = protocol::encode_request(command, args);
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = DaemonCommand::Request {
            line,
            reply: reply_tx,
        };
        if self.cmd_tx.send(request).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    #[must_use]
    pub fn status(&self) -> DaemonStatus {
        *self.status_rx.borrow()
    }

    /// Watch channel carrying every status transition.
    #[must_use]
    pub fn status_watch(&self) -> watch::Receiver<DaemonStatus> {
        self.status_rx.clone()
    }

    /// Tear the daemon down without scheduling a relaunch. Queued
    /// replies are flushed with empty results first.
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(DaemonCommand::Stop).await;
    }

    /// Stop then start. Queued replies are flushed with empty results.
    pub async fn restart(&self) {
        let _ = self.cmd_tx.send(DaemonCommand::Restart).await;
    }
}

/// Accumulates response lines until the sentinel. FIFO delivery to the
/// pending queue is the serve loop's job.
#[derive(Debug, Default)]
pub(crate) struct ResponseAssembler {
    lines: Vec<String>,
}

impl ResponseAssembler {
    /// Feed one stdout line; returns the completed response when the
    /// line begins with the sentinel.
    pub fn push(&mut self, line: &str) -> Option<Vec<String>> {
        if line.starts_with(protocol::SENTINEL) {
            Some(std::mem::take(&mut self.lines))
        } else {
            self.lines.push(line.to_string());
            None
        }
    }
}

enum Served {
    /// Unexpected exit, stdout EOF, or a stdin write failure.
    Crashed,
    /// Explicit stop command.
    Stopped,
    /// Explicit restart command.
    Restart,
    /// Every handle is gone; the actor can exit.
    HandleDropped,
}

async fn run_daemon(
    spec: DaemonSpec,
    mut cmd_rx: mpsc::Receiver<DaemonCommand>,
    status_tx: watch::Sender<DaemonStatus>,
) {
    loop {
        let _ = status_tx.send(DaemonStatus::Starting);

        let resolved = match which::which(&spec.command) {
            Ok(path) => path,
            Err(_) => {
                tracing::warn!(
                    command = %spec.command,
                    "completion daemon executable not found; completions disabled"
                );
                let _ = status_tx.send(DaemonStatus::NotFound);
                answer_empty_until_closed(&mut cmd_rx).await;
                return;
            }
        };

        let mut command = Command::new(&resolved);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(command = %spec.command, "failed to spawn completion daemon: {e}");
                let _ = status_tx.send(DaemonStatus::Crashed);
                if crash_backoff(&mut cmd_rx, &status_tx, spec.restart_delay).await {
                    continue;
                }
                return;
            }
        };

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            let _ = status_tx.send(DaemonStatus::Crashed);
            if crash_backoff(&mut cmd_rx, &status_tx, spec.restart_delay).await {
                continue;
            }
            return;
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr));
        }

        let _ = status_tx.send(DaemonStatus::Running);
        tracing::info!(command = %spec.command, "completion daemon started");

        match serve(&mut child, stdin, stdout, &mut cmd_rx).await {
            Served::HandleDropped => return,
            Served::Restart => {}
            Served::Stopped => {
                let _ = status_tx.send(DaemonStatus::Stopped);
                if !wait_for_restart(&mut cmd_rx).await {
                    return;
                }
            }
            Served::Crashed => {
                let _ = status_tx.send(DaemonStatus::Crashed);
                if !crash_backoff(&mut cmd_rx, &status_tx, spec.restart_delay).await {
                    return;
                }
            }
        }
    }
}

/// One session against a live child. Whatever ends the session flushes
/// the pending queue so no caller hangs.
async fn serve(
    child: &mut Child,
    mut stdin: ChildStdin,
    stdout: ChildStdout,
    cmd_rx: &mut mpsc::Receiver<DaemonCommand>,
) -> Served {
    let mut pending: VecDeque<oneshot::Sender<Vec<String>>> = VecDeque::new();
    let mut assembler = ResponseAssembler::default();
    let mut lines = BufReader::new(stdout).lines();

    let outcome = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None => break Served::HandleDropped,
                Some(DaemonCommand::Request { line, reply }) => {
                    pending.push_back(reply);
                    if stdin.write_all(line.as_bytes()).await.is_err()
                        || stdin.flush().await.is_err()
                    {
                        tracing::warn!("completion daemon stdin closed");
                        break Served::Crashed;
                    }
                }
                Some(DaemonCommand::Stop) => break Served::Stopped,
                Some(DaemonCommand::Restart) => break Served::Restart,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(response) = assembler.push(&line) {
                        match pending.pop_front() {
                            Some(reply) => {
                                let _ = reply.send(response);
                            }
                            None => {
                                tracing::warn!("completion daemon response with no pending request");
                            }
                        }
                    }
                }
                Ok(None) | Err(_) => {
                    tracing::warn!("completion daemon closed its stdout");
                    break Served::Crashed;
                }
            },
            status = child.wait() => {
                match status {
                    Ok(status) => {
                        tracing::warn!(code = status.code(), "completion daemon exited");
                    }
                    Err(e) => tracing::warn!("completion daemon wait failed: {e}"),
                }
                break Served::Crashed;
            }
        }
    };

    flush_pending(&mut pending);
    let _ = child.start_kill();
    outcome
}

fn flush_pending(pending: &mut VecDeque<oneshot::Sender<Vec<String>>>) {
    for reply in pending.drain(..) {
        let _ = reply.send(Vec::new());
    }
}

/// Sit out the restart delay, answering requests with empty results so
/// nothing queues into a dead session. Returns false when every handle
/// is gone.
async fn crash_backoff(
    cmd_rx: &mut mpsc::Receiver<DaemonCommand>,
    status_tx: &watch::Sender<DaemonStatus>,
    delay: Duration,
) -> bool {
    let deadline = tokio::time::sleep(delay);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => return true,
            cmd = cmd_rx.recv() => match cmd {
                None => return false,
                Some(DaemonCommand::Request { reply, .. }) => {
                    let _ = reply.send(Vec::new());
                }
                Some(DaemonCommand::Restart) => return true,
                Some(DaemonCommand::Stop) => {
                    let _ = status_tx.send(DaemonStatus::Stopped);
                    return wait_for_restart(cmd_rx).await;
                }
            }
        }
    }
}

/// Stopped state: answer requests empty until a restart command (true)
/// or channel close (false).
async fn wait_for_restart(cmd_rx: &mut mpsc::Receiver<DaemonCommand>) -> bool {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            DaemonCommand::Request { reply, .. } => {
                let _ = reply.send(Vec::new());
            }
            DaemonCommand::Restart => return true,
            DaemonCommand::Stop => {}
        }
    }
    false
}

/// Terminal state for a missing executable: a restart cannot help.
async fn answer_empty_until_closed(cmd_rx: &mut mpsc::Receiver<DaemonCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        if let DaemonCommand::Request { reply, .. } = cmd {
            let _ = reply.send(Vec::new());
        }
    }
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!("daemon stderr: {line}");
    }
}
