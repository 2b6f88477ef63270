//! Integration tests for the task supervisor's conflict handling.

#![cfg(unix)]

use std::io::Write;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use gantry_config::ConflictPolicy;
use gantry_tasks::{
    ProcessSpec, StartOutcome, TaskEvent, TaskKind, TaskOutcome, TaskSupervisor,
};

const WAIT: Duration = Duration::from_secs(10);

fn sh(script: &str) -> ProcessSpec {
    ProcessSpec::new("sh", std::env::temp_dir())
        .arg("-c")
        .arg(script)
}

async fn next_event(rx: &mut mpsc::Receiver<TaskEvent>) -> TaskEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for task event")
        .expect("event channel closed")
}

/// Drain events until a `Finished` for the given task arrives; returns
/// its outcome and every event seen on the way.
async fn wait_for_finish(
    rx: &mut mpsc::Receiver<TaskEvent>,
    id: gantry_tasks::TaskId,
) -> (TaskOutcome, Vec<TaskEvent>) {
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await;
        if let TaskEvent::Finished {
            id: finished_id,
            outcome,
            ..
        } = &event
            && *finished_id == id
        {
            return (outcome.clone(), seen);
        }
        seen.push(event);
    }
}

#[tokio::test]
async fn ignore_policy_spawns_exactly_once() {
    let (tx, mut rx) = mpsc::channel(256);
    let mut supervisor = TaskSupervisor::new(ConflictPolicy::Ignore, tx);

    let first = supervisor
        .start_task(TaskKind::Background, sh("sleep 2"), "first")
        .await
        .unwrap();
    let StartOutcome::Started(first_id) = first else {
        panic!("first task must start");
    };
    assert!(supervisor.has_running_task(TaskKind::Background));

    let second = supervisor
        .start_task(TaskKind::Background, sh("sleep 2"), "second")
        .await
        .unwrap();
    assert_eq!(second, StartOutcome::Ignored);

    // Only the first task ever produced a Started event.
    supervisor.stop_running_task(TaskKind::Background);
    let mut started = Vec::new();
    loop {
        match next_event(&mut rx).await {
            TaskEvent::Started { id, .. } => started.push(id),
            TaskEvent::Finished { .. } => break,
            _ => {}
        }
    }
    assert_eq!(started, vec![first_id]);
}

#[tokio::test]
async fn stop_running_policy_cancels_then_starts() {
    let (tx, mut rx) = mpsc::channel(256);
    let mut supervisor = TaskSupervisor::new(ConflictPolicy::StopRunning, tx);

    let StartOutcome::Started(first_id) = supervisor
        .start_task(TaskKind::Background, sh("sleep 30"), "long")
        .await
        .unwrap()
    else {
        panic!("first task must start");
    };

    let StartOutcome::Started(second_id) = supervisor
        .start_task(TaskKind::Background, sh("true"), "quick")
        .await
        .unwrap()
    else {
        panic!("second task must start");
    };
    assert_ne!(first_id, second_id);

    let mut cancelled = false;
    let mut completed = false;
    while !(cancelled && completed) {
        if let TaskEvent::Finished { id, outcome, .. } = next_event(&mut rx).await {
            if id == first_id {
                assert_eq!(outcome, TaskOutcome::Cancelled);
                cancelled = true;
            } else if id == second_id {
                assert_eq!(outcome, TaskOutcome::Completed(0));
                completed = true;
            }
        }
    }
}

#[tokio::test]
async fn categories_are_independent() {
    let (tx, _rx) = mpsc::channel(256);
    let mut supervisor = TaskSupervisor::new(ConflictPolicy::Ignore, tx);

    supervisor
        .start_task(TaskKind::Background, sh("sleep 2"), "bg")
        .await
        .unwrap();
    let terminal = supervisor
        .start_task(TaskKind::Terminal, sh("sleep 2"), "term")
        .await
        .unwrap();
    assert!(matches!(terminal, StartOutcome::Started(_)));
    assert!(supervisor.has_running_task(TaskKind::Background));
    assert!(supervisor.has_running_task(TaskKind::Terminal));

    supervisor.stop_running_task(TaskKind::Background);
    supervisor.stop_running_task(TaskKind::Terminal);
}

#[tokio::test]
async fn ask_policy_answer_false_keeps_running_task() {
    let (tx, rx) = mpsc::channel(256);
    let (fwd_tx, mut fwd_rx) = mpsc::channel(256);
    tokio::spawn(answer_prompts(rx, false, fwd_tx));

    let mut supervisor = TaskSupervisor::new(ConflictPolicy::Ask, tx);
    let first = supervisor
        .start_task(TaskKind::Background, sh("sleep 5"), "first")
        .await
        .unwrap();
    let StartOutcome::Started(first_id) = first else {
        panic!("first task must start");
    };

    let second = supervisor
        .start_task(TaskKind::Background, sh("true"), "second")
        .await
        .unwrap();
    assert_eq!(second, StartOutcome::Ignored);
    assert_eq!(
        supervisor.running_task_id(TaskKind::Background),
        Some(first_id)
    );

    supervisor.stop_running_task(TaskKind::Background);
    loop {
        if let TaskEvent::Finished { id, outcome, .. } = next_event(&mut fwd_rx).await {
            assert_eq!(id, first_id);
            assert_eq!(outcome, TaskOutcome::Cancelled);
            break;
        }
    }
}

#[tokio::test]
async fn ask_policy_answer_true_replaces_running_task() {
    let (tx, rx) = mpsc::channel(256);
    let (fwd_tx, mut fwd_rx) = mpsc::channel(256);
    tokio::spawn(answer_prompts(rx, true, fwd_tx));

    let mut supervisor = TaskSupervisor::new(ConflictPolicy::Ask, tx);
    let StartOutcome::Started(first_id) = supervisor
        .start_task(TaskKind::Background, sh("sleep 30"), "first")
        .await
        .unwrap()
    else {
        panic!("first task must start");
    };

    let second = supervisor
        .start_task(TaskKind::Background, sh("true"), "second")
        .await
        .unwrap();
    let StartOutcome::Started(second_id) = second else {
        panic!("second task must start after a yes answer");
    };
    assert_ne!(first_id, second_id);

    let mut cancelled = false;
    let mut completed = false;
    while !(cancelled && completed) {
        if let TaskEvent::Finished { id, outcome, .. } = next_event(&mut fwd_rx).await {
            if id == first_id {
                assert_eq!(outcome, TaskOutcome::Cancelled);
                cancelled = true;
            } else if id == second_id {
                assert_eq!(outcome, TaskOutcome::Completed(0));
                completed = true;
            }
        }
    }
}

#[tokio::test]
async fn ask_policy_dismissed_prompt_counts_as_ignore() {
    let (tx, mut rx) = mpsc::channel(256);
    let (dismissed_tx, mut dismissed_rx) = mpsc::channel(4);
    // Drop the prompt's sender without answering — a dismissed dialog.
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let TaskEvent::ConflictPrompt { respond, .. } = event {
                drop(respond);
                let _ = dismissed_tx.send(()).await;
            }
        }
    });

    let mut supervisor = TaskSupervisor::new(ConflictPolicy::Ask, tx);
    let StartOutcome::Started(first_id) = supervisor
        .start_task(TaskKind::Background, sh("sleep 5"), "first")
        .await
        .unwrap()
    else {
        panic!("first task must start");
    };

    let second = supervisor
        .start_task(TaskKind::Background, sh("true"), "second")
        .await
        .unwrap();
    assert_eq!(second, StartOutcome::Ignored);
    timeout(WAIT, dismissed_rx.recv())
        .await
        .expect("prompt must have been shown")
        .expect("dismiss notifier closed");
    assert_eq!(
        supervisor.running_task_id(TaskKind::Background),
        Some(first_id)
    );
    supervisor.stop_running_task(TaskKind::Background);
}

/// Forward events, answering any conflict prompt with `answer`.
async fn answer_prompts(
    mut rx: mpsc::Receiver<TaskEvent>,
    answer: bool,
    fwd_tx: mpsc::Sender<TaskEvent>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            TaskEvent::ConflictPrompt { respond, .. } => {
                let _ = respond.send(answer);
            }
            other => {
                if fwd_tx.send(other).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[tokio::test]
async fn missing_tool_reports_not_installed() {
    let (tx, mut rx) = mpsc::channel(256);
    let mut supervisor = TaskSupervisor::new(ConflictPolicy::StopRunning, tx);

    let spec = ProcessSpec::new("gantry-no-such-tool-54321", std::env::temp_dir());
    let err = supervisor
        .start_task(TaskKind::Background, spec, "missing")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    match next_event(&mut rx).await {
        TaskEvent::ToolNotInstalled { command } => {
            assert_eq!(command, "gantry-no-such-tool-54321");
        }
        other => panic!("expected ToolNotInstalled, got {other:?}"),
    }
    assert!(!supervisor.has_running_task(TaskKind::Background));
}

#[tokio::test]
async fn background_stdout_is_decoded_and_deduplicated() {
    let message = serde_json::json!({
        "reason": "compiler-message",
        "message": {
            "message": "unused variable: `x`",
            "level": "warning",
            "spans": [{
                "file_name": "src/lib.rs",
                "line_start": 4,
                "line_end": 4,
                "column_start": 9,
                "column_end": 10,
                "is_primary": true,
            }],
            "children": [],
        }
    })
    .to_string();

    // The same diagnostic twice, plus an artifact record, plus noise.
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "{message}").unwrap();
    writeln!(script, "{message}").unwrap();
    writeln!(script, "{}", serde_json::json!({"reason": "compiler-artifact"})).unwrap();
    writeln!(script, "not json at all").unwrap();
    script.flush().unwrap();

    let (tx, mut rx) = mpsc::channel(256);
    let mut supervisor = TaskSupervisor::new(ConflictPolicy::StopRunning, tx);
    let spec = ProcessSpec::new("cat", std::env::temp_dir())
        .arg(script.path().display().to_string());
    let StartOutcome::Started(id) = supervisor
        .start_task(TaskKind::Background, spec, "check")
        .await
        .unwrap()
    else {
        panic!("task must start");
    };

    let (outcome, seen) = wait_for_finish(&mut rx, id).await;
    assert_eq!(outcome, TaskOutcome::Completed(0));

    let files = seen
        .into_iter()
        .find_map(|event| match event {
            TaskEvent::Diagnostics { files, .. } => Some(files),
            _ => None,
        })
        .expect("background task must publish diagnostics");
    assert_eq!(files.len(), 1);
    let (path, diagnostics) = &files[0];
    assert_eq!(path, &std::path::PathBuf::from("src/lib.rs"));
    assert_eq!(diagnostics.len(), 1, "duplicate line must be deduplicated");
    assert_eq!(diagnostics[0].message(), "unused variable: `x`");
}

#[tokio::test]
async fn terminal_tasks_do_not_publish_diagnostics() {
    let (tx, mut rx) = mpsc::channel(256);
    let mut supervisor = TaskSupervisor::new(ConflictPolicy::StopRunning, tx);
    let StartOutcome::Started(id) = supervisor
        .start_task(TaskKind::Terminal, sh("echo '{}'"), "term")
        .await
        .unwrap()
    else {
        panic!("task must start");
    };

    let (outcome, seen) = wait_for_finish(&mut rx, id).await;
    assert_eq!(outcome, TaskOutcome::Completed(0));
    assert!(
        !seen
            .iter()
            .any(|event| matches!(event, TaskEvent::Diagnostics { .. })),
        "terminal tasks forward raw output only"
    );
}
