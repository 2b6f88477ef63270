//! Records produced by completion-daemon queries.
//!
//! These are flat value types with no persistent identity — each query
//! produces them fresh and the front end consumes them immediately.

use std::path::PathBuf;

use serde::Serialize;

use crate::diagnostic::Position;

/// Presentation kind for a completion entry.
///
/// The daemon's kind vocabulary is open-ended; `Text` is the explicit
/// fallback for tags this build does not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompletionKind {
    Class,
    Module,
    Variable,
    Function,
    Field,
    Enum,
    Interface,
    Keyword,
    Text,
}

impl CompletionKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::Function => "function",
            Self::Field => "field",
            Self::Enum => "enum",
            Self::Interface => "interface",
            Self::Keyword => "keyword",
            Self::Text => "text",
        }
    }
}

/// One completion candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionItem {
    pub label: String,
    /// Text to insert when the candidate is accepted.
    pub snippet: String,
    pub kind: CompletionKind,
    /// Declaration or context text, cleaned of any trailing body.
    pub detail: String,
    pub docs: Option<String>,
}

/// Where a symbol is defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub file: PathBuf,
    pub position: Position,
}

/// Hover content: ordered markdown blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hover {
    pub blocks: Vec<String>,
}

/// Signature help for an in-progress call expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureHelp {
    /// The full declaration the parameters were parsed from.
    pub label: String,
    pub parameters: Vec<String>,
    /// Index of the parameter under construction at the cursor.
    pub active_parameter: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels() {
        assert_eq!(CompletionKind::Function.label(), "function");
        assert_eq!(CompletionKind::Text.label(), "text");
    }

    #[test]
    fn records_serialize() {
        let item = CompletionItem {
            label: "push".to_string(),
            snippet: "push(${1:value})".to_string(),
            kind: CompletionKind::Function,
            detail: "fn push(&mut self, value: T)".to_string(),
            docs: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["label"], "push");
        assert_eq!(json["kind"], "Function");
    }
}
