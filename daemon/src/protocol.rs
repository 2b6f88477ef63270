//! Wire protocol of the completion daemon.
//!
//! Requests are one line: fields joined by tabs, terminated by a
//! newline. Responses are zero or more lines followed by a line
//! beginning with `END`. Match rows carry tab-separated fields at fixed
//! positions:
//!
//! ```text
//! MATCH<TAB>name<TAB>snippet<TAB>line<TAB>column<TAB>file<TAB>kind<TAB>detail[<TAB>docs]
//! ```
//!
//! A malformed row is skipped with a log entry; it never fails a query.

use std::path::PathBuf;

use gantry_types::{CompletionItem, CompletionKind, Definition, Position};

/// Prefix of the line that terminates one response.
pub const SENTINEL: &str = "END";

/// Token that opens a match row.
pub const MATCH_TOKEN: &str = "MATCH";

// Field positions after the MATCH token is stripped.
const FIELD_NAME: usize = 0;
const FIELD_SNIPPET: usize = 1;
const FIELD_LINE: usize = 2;
const FIELD_COLUMN: usize = 3;
const FIELD_FILE: usize = 4;
const FIELD_KIND: usize = 5;
const FIELD_DETAIL: usize = 6;
const FIELD_DOCS: usize = 7;

/// Serialize one request line.
#[must_use]
pub fn encode_request(command: &str, args: &[&str]) -> String {
    let mut line = String::from(command);
    for arg in args {
        line.push('\t');
        line.push_str(arg);
    }
    line.push('\n');
    line
}

/// Decode a definition response. The daemon answers with at most one
/// match row; no rows means no definition.
///
/// The row's line is 1-based and rebased to 0; the column is taken
/// exactly as the daemon emits it. The asymmetry is the wire format's,
/// and converting the column too would shift every definition target.
#[must_use]
pub fn parse_definition(lines: &[String]) -> Option<Definition> {
    let first = lines.iter().find(|line| !line.trim().is_empty())?;
    let record = first.strip_prefix(MATCH_TOKEN)?.strip_prefix('\t')?;
    let fields: Vec<&str> = record.split('\t').collect();
    if fields.len() <= FIELD_FILE {
        tracing::debug!("malformed definition row: {first}");
        return None;
    }
    let line: u32 = fields[FIELD_LINE].parse().ok()?;
    let column: u32 = fields[FIELD_COLUMN].parse().ok()?;
    Some(Definition {
        file: PathBuf::from(fields[FIELD_FILE]),
        position: Position::new(line.saturating_sub(1), column),
    })
}

/// Decode completion rows.
///
/// The daemon may flush one match across several physical lines, so the
/// response is reassembled into one string and re-split on the match
/// token before fields are extracted.
#[must_use]
pub fn parse_completions(lines: &[String]) -> Vec<CompletionItem> {
    let joined = lines.concat();
    let marker = format!("{MATCH_TOKEN}\t");
    let mut items = Vec::new();
    for record in joined.split(marker.as_str()).skip(1) {
        let fields: Vec<&str> = record.split('\t').collect();
        if fields.len() <= FIELD_DETAIL {
            tracing::debug!("malformed completion row: {record}");
            continue;
        }
        let kind_tag = fields[FIELD_KIND];
        let docs = fields
            .get(FIELD_DOCS)
            .filter(|docs| !docs.is_empty())
            .map(|docs| unescape_docs(docs));
        items.push(CompletionItem {
            label: fields[FIELD_NAME].to_string(),
            snippet: fields[FIELD_SNIPPET].to_string(),
            kind: completion_kind(kind_tag),
            detail: clean_detail(fields[FIELD_DETAIL], kind_tag),
            docs,
        });
    }
    items
}

/// Map the daemon's kind vocabulary onto presentation kinds.
///
/// The vocabulary is open-ended — new daemon versions introduce tags —
/// so unrecognized tags are a first-class case: `Text`, plus a log
/// entry, never an error.
fn completion_kind(tag: &str) -> CompletionKind {
    match tag {
        "Struct" | "Impl" | "TraitImpl" => CompletionKind::Class,
        "Module" | "Crate" => CompletionKind::Module,
        "Function" | "Macro" => CompletionKind::Function,
        "StructField" | "EnumVariant" => CompletionKind::Field,
        "Enum" => CompletionKind::Enum,
        "Trait" => CompletionKind::Interface,
        "Type" | "Builtin" => CompletionKind::Keyword,
        "Let" | "IfLet" | "WhileLet" | "For" | "MatchArm" | "FnArg" | "Const" | "Static" => {
            CompletionKind::Variable
        }
        other => {
            tracing::warn!(kind = other, "unrecognized completion kind");
            CompletionKind::Text
        }
    }
}

/// Strip a trailing `{`-delimited body from the detail text. Module
/// entries keep their detail untouched — it is a path, not a signature.
fn clean_detail(detail: &str, tag: &str) -> String {
    if matches!(tag, "Module" | "Crate") {
        return detail.to_string();
    }
    match detail.split_once('{') {
        Some((head, _)) => head.trim_end().to_string(),
        None => detail.to_string(),
    }
}

/// Documentation travels backslash-escaped on the single-line protocol.
fn unescape_docs(docs: &str) -> String {
    let mut out = String::with_capacity(docs.len());
    let mut chars = docs.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(';') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
