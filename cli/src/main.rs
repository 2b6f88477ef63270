//! Terminal driver for the task supervisor.
//!
//! `gantry <check|build> [dir]` runs the build tool through the
//! supervisor and prints the deduplicated diagnostics — the same path an
//! editor front end consumes, minus the editor. Raw tool output goes to
//! stderr, diagnostics to stdout, and the tool's exit code becomes ours.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use gantry_config::Config;
use gantry_tasks::{
    OutputSource, ProcessSpec, StartOutcome, TaskEvent, TaskKind, TaskOutcome, TaskSupervisor,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Flag that switches the build tool to machine-readable diagnostics.
const MACHINE_OUTPUT_FLAG: &str = "--message-format=json";

/// Exit code reported when the task was cancelled.
const CANCELLED_EXIT_CODE: u8 = 130;

fn usage() -> ExitCode {
    eprintln!("usage: gantry <check|build> [dir]");
    ExitCode::from(2)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(subcommand) = args.next() else {
        return Ok(usage());
    };
    if !matches!(subcommand.as_str(), "check" | "build") {
        return Ok(usage());
    }
    let dir = match args.next() {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("resolving current directory")?,
    };

    let config = Config::load(&dir).context("loading configuration")?;
    let tool = &config.tools.build;
    let mut spec = ProcessSpec::new(&tool.command, &dir)
        .arg(&subcommand)
        .arg(MACHINE_OUTPUT_FLAG)
        .args(tool.args.iter().cloned());
    for (key, value) in &tool.env {
        spec = spec.env(key, value);
    }
    let title = format!("{} {subcommand}", tool.command);

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let mut supervisor = TaskSupervisor::new(config.conflict_policy, event_tx);

    match supervisor
        .start_task(TaskKind::Background, spec, title)
        .await
    {
        Ok(StartOutcome::Started(_)) => {}
        Ok(StartOutcome::Ignored) => return Ok(ExitCode::SUCCESS),
        Err(e) if e.is_not_found() => {
            eprintln!("error: {e} — install it and retry");
            return Ok(ExitCode::from(127));
        }
        Err(e) => return Err(e).context("starting task"),
    }

    let mut exit = ExitCode::SUCCESS;
    while let Some(event) = event_rx.recv().await {
        match event {
            TaskEvent::OutputLine { source, line, .. } => {
                // The stdout stream is the machine-readable one; only
                // the tool's human chatter on stderr is forwarded.
                if source == OutputSource::Stderr {
                    eprintln!("{line}");
                }
            }
            TaskEvent::Diagnostics { files, .. } => {
                for (path, diagnostics) in &files {
                    for diagnostic in diagnostics {
                        println!("{}", diagnostic.display_with_path(path));
                    }
                }
            }
            TaskEvent::Finished { outcome, .. } => {
                exit = match outcome {
                    TaskOutcome::Completed(code) => {
                        ExitCode::from(u8::try_from(code.clamp(0, 255)).unwrap_or(1))
                    }
                    TaskOutcome::Cancelled => ExitCode::from(CANCELLED_EXIT_CODE),
                    TaskOutcome::Failed(error) => {
                        eprintln!("error: {error}");
                        ExitCode::FAILURE
                    }
                };
                break;
            }
            // A terminal has no dialog; resolve conflicts by stopping
            // the running task.
            TaskEvent::ConflictPrompt { respond, .. } => {
                let _ = respond.send(true);
            }
            TaskEvent::Started { .. } | TaskEvent::ToolNotInstalled { .. } => {}
        }
    }

    Ok(exit)
}
