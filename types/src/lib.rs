//! Shared data model for the gantry workspace.
//!
//! These types define the interface between the supervision/parsing
//! crates and whatever front end displays the results. Everything here
//! is a plain value: positions, ranges, diagnostics, and the flat
//! records produced by completion queries.

mod completion;
mod diagnostic;

pub use completion::{CompletionItem, CompletionKind, Definition, Hover, SignatureHelp};
pub use diagnostic::{Diagnostic, Position, Range, Severity};
