//! Task supervisor — at most one running task per category.
//!
//! The two categories (background check/build runs, and tasks hosted in
//! a terminal pane) are independent; each has its own running slot. A
//! request against an occupied slot is resolved by the configured
//! conflict policy before anything new is spawned, so no two processes
//! ever share a slot.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use gantry_config::ConflictPolicy;
use gantry_types::Diagnostic;

use crate::check;
use crate::diagnostics::DiagnosticsStore;
use crate::process::{
    ExitOutcome, OutputSource, ProcessEvent, ProcessHandle, ProcessSpec, SpawnError,
};

const PROCESS_CHANNEL_CAPACITY: usize = 256;

/// Independent running-task slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Check/build runs whose stdout is decoded into diagnostics.
    Background,
    /// Tasks hosted in a terminal pane; output is forwarded raw.
    Terminal,
}

/// Monotonically increasing task identity. A late event from a
/// superseded task can never be mistaken for the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(i32),
    Cancelled,
    Failed(String),
}

/// Events delivered to the front end.
#[derive(Debug)]
pub enum TaskEvent {
    Started {
        kind: TaskKind,
        id: TaskId,
        title: String,
    },
    OutputLine {
        kind: TaskKind,
        id: TaskId,
        source: OutputSource,
        line: String,
    },
    /// Per-file replacement sets from a background run, errors first.
    /// Sent once, just before `Finished`.
    Diagnostics {
        kind: TaskKind,
        id: TaskId,
        files: Vec<(PathBuf, Vec<Diagnostic>)>,
    },
    /// A new task collided with a running one under the `Ask` policy.
    /// Answer `true` to stop the running task and proceed; `false`, or
    /// dropping the sender, keeps the running task and drops the
    /// request.
    ConflictPrompt {
        kind: TaskKind,
        title: String,
        respond: oneshot::Sender<bool>,
    },
    /// The executable does not exist; distinct from a task failure so
    /// the front end can offer to install it.
    ToolNotInstalled { command: String },
    Finished {
        kind: TaskKind,
        id: TaskId,
        outcome: TaskOutcome,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(TaskId),
    /// The request was dropped by the conflict policy.
    Ignored,
}

struct RunningTask {
    id: TaskId,
    handle: ProcessHandle,
    driver: JoinHandle<()>,
}

/// Owns the running-task slots. Constructed once per session and passed
/// by reference to collaborators — never a global.
pub struct TaskSupervisor {
    policy: ConflictPolicy,
    event_tx: mpsc::Sender<TaskEvent>,
    background: Option<RunningTask>,
    terminal: Option<RunningTask>,
    next_id: u64,
}

impl TaskSupervisor {
    #[must_use]
    pub fn new(policy: ConflictPolicy, event_tx: mpsc::Sender<TaskEvent>) -> Self {
        Self {
            policy,
            event_tx,
            background: None,
            terminal: None,
            next_id: 0,
        }
    }

    fn slot(&self, kind: TaskKind) -> &Option<RunningTask> {
        match kind {
            TaskKind::Background => &self.background,
            TaskKind::Terminal => &self.terminal,
        }
    }

    fn slot_mut(&mut self, kind: TaskKind) -> &mut Option<RunningTask> {
        match kind {
            TaskKind::Background => &mut self.background,
            TaskKind::Terminal => &mut self.terminal,
        }
    }

    /// Whether the slot currently holds a live task. Pure query; the
    /// slot counts as free once the task's driver has finished.
    #[must_use]
    pub fn has_running_task(&self, kind: TaskKind) -> bool {
        self.slot(kind)
            .as_ref()
            .is_some_and(|task| !task.driver.is_finished())
    }

    /// Id of the task currently occupying the slot, if it is live.
    #[must_use]
    pub fn running_task_id(&self, kind: TaskKind) -> Option<TaskId> {
        self.slot(kind)
            .as_ref()
            .filter(|task| !task.driver.is_finished())
            .map(|task| task.id)
    }

    /// Start a task in the given slot, resolving a conflict with any
    /// running task via the configured policy first.
    ///
    /// Suspends only under the `Ask` policy, while the front end answers
    /// the conflict prompt.
    pub async fn start_task(
        &mut self,
        kind: TaskKind,
        spec: ProcessSpec,
        title: impl Into<String>,
    ) -> Result<StartOutcome, SpawnError> {
        let title = title.into();
        if self.has_running_task(kind) {
            match self.policy {
                ConflictPolicy::Ignore => {
                    tracing::debug!(?kind, title = %title, "task already running; request ignored");
                    return Ok(StartOutcome::Ignored);
                }
                ConflictPolicy::StopRunning => self.stop_running_task(kind),
                ConflictPolicy::Ask => {
                    let (respond, answer) = oneshot::channel();
                    let prompt = TaskEvent::ConflictPrompt {
                        kind,
                        title: title.clone(),
                        respond,
                    };
                    if self.event_tx.send(prompt).await.is_err() {
                        return Ok(StartOutcome::Ignored);
                    }
                    match answer.await {
                        Ok(true) => self.stop_running_task(kind),
                        // A dismissed prompt counts as "keep the running
                        // task".
                        Ok(false) | Err(_) => return Ok(StartOutcome::Ignored),
                    }
                }
            }
        }
        self.spawn_into_slot(kind, spec, title).await
    }

    /// Kill the task occupying the slot, if any. The signal send is the
    /// acknowledgement — the slot is considered free for a subsequent
    /// `start_task` immediately; the OS reaps the old process and its
    /// `Finished(Cancelled)` event arrives on its own time.
    pub fn stop_running_task(&mut self, kind: TaskKind) {
        if let Some(task) = self.slot(kind).as_ref()
            && !task.driver.is_finished()
        {
            tracing::info!(?kind, id = ?task.id, "stopping running task");
            task.handle.kill();
        }
    }

    async fn spawn_into_slot(
        &mut self,
        kind: TaskKind,
        spec: ProcessSpec,
        title: String,
    ) -> Result<StartOutcome, SpawnError> {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let (proc_tx, proc_rx) = mpsc::channel(PROCESS_CHANNEL_CAPACITY);
        let handle = match ProcessHandle::spawn(&spec, proc_tx) {
            Ok(handle) => handle,
            Err(e) => {
                if e.is_not_found() {
                    let event = TaskEvent::ToolNotInstalled {
                        command: spec.command.clone(),
                    };
                    let _ = self.event_tx.send(event).await;
                } else {
                    tracing::warn!(command = %spec.command, "spawn failed: {e}");
                }
                return Err(e);
            }
        };

        let started = TaskEvent::Started {
            kind,
            id,
            title: title.clone(),
        };
        let _ = self.event_tx.send(started).await;
        let driver = tokio::spawn(drive_task(kind, id, proc_rx, self.event_tx.clone()));
        tracing::info!(?kind, ?id, title = %title, "task started");
        *self.slot_mut(kind) = Some(RunningTask { id, handle, driver });
        Ok(StartOutcome::Started(id))
    }
}

/// Pump one task's process events into task events. Background stdout
/// additionally feeds the diagnostic parser; the accumulated per-file
/// sets go out just before `Finished`.
async fn drive_task(
    kind: TaskKind,
    id: TaskId,
    mut proc_rx: mpsc::Receiver<ProcessEvent>,
    event_tx: mpsc::Sender<TaskEvent>,
) {
    let mut store = DiagnosticsStore::new();
    while let Some(event) = proc_rx.recv().await {
        match event {
            ProcessEvent::Line { source, line } => {
                if kind == TaskKind::Background
                    && source == OutputSource::Stdout
                    && let Some(parsed) = check::parse_line(&line)
                {
                    store.insert(parsed.file, parsed.diagnostic);
                }
                let event = TaskEvent::OutputLine {
                    kind,
                    id,
                    source,
                    line,
                };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            ProcessEvent::Exited(exit) => {
                if kind == TaskKind::Background {
                    let files = std::mem::take(&mut store).into_files();
                    let _ = event_tx.send(TaskEvent::Diagnostics { kind, id, files }).await;
                }
                let outcome = match exit {
                    ExitOutcome::Exited(code) => TaskOutcome::Completed(code),
                    ExitOutcome::Cancelled => TaskOutcome::Cancelled,
                    ExitOutcome::Failed(error) => TaskOutcome::Failed(error),
                };
                let _ = event_tx.send(TaskEvent::Finished { kind, id, outcome }).await;
                return;
            }
        }
    }
}
