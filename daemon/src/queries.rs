//! Editor-facing queries against the completion daemon.
//!
//! Every operation is total: when the daemon is crashed, missing, or
//! answers nonsense, the result is empty — never an error. The buffer
//! text may be ahead of the on-disk file, so each query writes it to a
//! temporary substitute file and hands the daemon both paths.

use std::io::Write;
use std::path::Path;

use gantry_types::{CompletionItem, Definition, Hover, Position, SignatureHelp};

use crate::client::Daemon;
use crate::{hover, protocol, signature};

const CMD_COMPLETE: &str = "complete-with-snippet";
const CMD_DEFINITION: &str = "find-definition";

/// One cursor-position query: the file's path, the 0-based cursor
/// position, and the full buffer text.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    pub file: &'a Path,
    pub position: Position,
    pub text: &'a str,
}

impl Query<'_> {
    fn current_line(&self) -> Option<&str> {
        self.text.lines().nth(self.position.line as usize)
    }
}

impl Daemon {
    /// Where the symbol under the cursor is defined.
    pub async fn definition(&self, query: Query<'_>) -> Option<Definition> {
        let lines = self
            .query_at(CMD_DEFINITION, query, query.position.column)
            .await;
        protocol::parse_definition(&lines)
    }

    /// Completion candidates at the cursor.
    pub async fn completions(&self, query: Query<'_>) -> Vec<CompletionItem> {
        let lines = self
            .query_at(CMD_COMPLETE, query, query.position.column)
            .await;
        protocol::parse_completions(&lines)
    }

    /// Hover content for the word under the cursor.
    pub async fn hover(&self, query: Query<'_>) -> Option<Hover> {
        let line = query.current_line()?;
        let (start, end) = hover::word_at(line, query.position.column as usize)?;
        let word = &line[start..end];
        // Query at the end of the word so the daemon sees the complete
        // identifier.
        let lines = self.query_at(CMD_COMPLETE, query, end as u32).await;
        let candidates = protocol::parse_completions(&lines);
        let candidate = hover::select_candidate(&candidates, word, &line[end..])?;
        Some(hover::build_hover(candidate))
    }

    /// Signature help for the call expression enclosing the cursor.
    pub async fn signature(&self, query: Query<'_>) -> Option<SignatureHelp> {
        let line = query.current_line()?;
        let cursor = (query.position.column as usize).min(line.len());
        let before = &line[..cursor];
        let call = signature::enclosing_call(before)?;
        let (start, end) = hover::word_at(line, call.open.saturating_sub(1))?;
        if end != call.open {
            // The `(` does not directly follow a word; not a call.
            return None;
        }
        let callee = &line[start..end];
        let args = &before[call.open + 1..];

        let lines = self.query_at(CMD_COMPLETE, query, end as u32).await;
        let candidates = protocol::parse_completions(&lines);
        let candidate = candidates.iter().find(|c| c.label == callee)?;
        signature::build_signature(&candidate.detail, args)
    }

    /// Issue one positional request: 1-based line, column as given, the
    /// file's path, and the substitute file carrying the buffer text.
    async fn query_at(&self, command: &str, query: Query<'_>, column: u32) -> Vec<String> {
        let Some(substitute) = write_substitute(query.text) else {
            return Vec::new();
        };
        let line = (query.position.line + 1).to_string();
        let column = column.to_string();
        let file = query.file.display().to_string();
        let substitute_path = substitute.path().display().to_string();
        self.request(command, &[&line, &column, &file, &substitute_path])
            .await
    }
}

fn write_substitute(text: &str) -> Option<tempfile::NamedTempFile> {
    let mut file = match tempfile::NamedTempFile::new() {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!("failed to create substitute file: {e}");
            return None;
        }
    };
    match file.write_all(text.as_bytes()).and_then(|()| file.flush()) {
        Ok(()) => Some(file),
        Err(e) => {
            tracing::warn!("failed to write substitute file: {e}");
            None
        }
    }
}
