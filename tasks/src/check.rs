//! Parser for the build tool's machine-readable diagnostic stream.
//!
//! The build tool emits one JSON object per stdout line, discriminated
//! by a `reason` field. Only `compiler-message` records carry
//! diagnostics; everything else (artifact notices, build-script output,
//! the final summary) parses to nothing. A malformed line is skipped
//! with a trace log — one bad line never aborts a run.

use std::path::PathBuf;

use serde::Deserialize;

use gantry_types::{Diagnostic, Position, Range, Severity};

#[derive(Debug, Deserialize)]
struct ToolRecord {
    reason: String,
    #[serde(default)]
    message: Option<CompilerMessage>,
}

#[derive(Debug, Deserialize)]
struct CompilerMessage {
    message: String,
    level: String,
    #[serde(default)]
    code: Option<DiagnosticCode>,
    #[serde(default)]
    spans: Vec<DiagnosticSpan>,
    #[serde(default)]
    children: Vec<CompilerMessage>,
}

#[derive(Debug, Deserialize)]
struct DiagnosticCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct DiagnosticSpan {
    file_name: String,
    line_start: u32,
    line_end: u32,
    column_start: u32,
    column_end: u32,
    #[serde(default)]
    is_primary: bool,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    expansion: Option<Box<SpanExpansion>>,
}

#[derive(Debug, Deserialize)]
struct SpanExpansion {
    span: DiagnosticSpan,
}

/// A diagnostic plus the file it belongs to. Paths may be relative to
/// the project root; resolution is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiagnostic {
    pub file: PathBuf,
    pub diagnostic: Diagnostic,
}

/// Decode one stdout line into at most one diagnostic.
#[must_use]
pub fn parse_line(line: &str) -> Option<FileDiagnostic> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let record: ToolRecord = match serde_json::from_str(trimmed) {
        Ok(record) => record,
        Err(e) => {
            tracing::trace!("skipping unparseable build output line: {e}");
            return None;
        }
    };
    if record.reason != "compiler-message" {
        return None;
    }
    let message = record.message?;
    // Only the primary span is surfaced; the sibling spans are
    // near-duplicates that would flood the list.
    let primary = message.spans.iter().find(|span| span.is_primary)?;
    let span = innermost_expansion(primary);
    Some(FileDiagnostic {
        file: PathBuf::from(&span.file_name),
        diagnostic: Diagnostic::new(
            span_range(span),
            severity(&message.level),
            render_message(&message, span),
        ),
    })
}

/// A span produced by macro expansion points at the expansion site; the
/// innermost concrete span is the location shown to the user.
fn innermost_expansion(span: &DiagnosticSpan) -> &DiagnosticSpan {
    let mut span = span;
    while let Some(expansion) = &span.expansion {
        span = &expansion.span;
    }
    span
}

/// Wire ranges are 1-based on both axes; the normalized model is
/// 0-based on both.
fn span_range(span: &DiagnosticSpan) -> Range {
    Range::new(
        Position::new(
            span.line_start.saturating_sub(1),
            span.column_start.saturating_sub(1),
        ),
        Position::new(
            span.line_end.saturating_sub(1),
            span.column_end.saturating_sub(1),
        ),
    )
}

fn severity(level: &str) -> Severity {
    match level {
        "warning" => Severity::Warning,
        "note" => Severity::Info,
        "help" => Severity::Hint,
        _ => Severity::Error,
    }
}

fn render_message(message: &CompilerMessage, primary: &DiagnosticSpan) -> String {
    let mut text = match &message.code {
        Some(code) => format!("{}: {}", code.code, message.message),
        None => message.message.clone(),
    };
    if let Some(label) = &primary.label
        && !label.is_empty()
    {
        text.push('\n');
        text.push_str(label);
    }
    for child in &message.children {
        append_note(&mut text, child, 1);
    }
    text
}

fn append_note(out: &mut String, note: &CompilerMessage, depth: usize) {
    let indent = "  ".repeat(depth);
    out.push('\n');
    out.push_str(&format!("{indent}{}: {}", note.level, note.message));
    for span in &note.spans {
        out.push('\n');
        out.push_str(&format!("{indent}  {}({})", span.file_name, span.line_start));
    }
    for nested in &note.children {
        append_note(out, nested, depth + 1);
    }
}
