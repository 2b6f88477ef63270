//! Task supervision for external toolchain processes.
//!
//! The pieces, bottom up: [`process`] spawns one child and streams its
//! output as whole lines with a single terminal outcome; [`check`]
//! decodes the build tool's JSON-lines diagnostic stream; [`diagnostics`]
//! deduplicates per-file diagnostics; [`supervisor`] owns the
//! at-most-one-running-task slots and the conflict policy.

pub mod check;
pub mod diagnostics;
pub mod process;
pub mod supervisor;

pub use check::FileDiagnostic;
pub use diagnostics::DiagnosticsStore;
pub use process::{ExitOutcome, OutputSource, ProcessEvent, ProcessHandle, ProcessSpec, SpawnError};
pub use supervisor::{StartOutcome, TaskEvent, TaskId, TaskKind, TaskOutcome, TaskSupervisor};
