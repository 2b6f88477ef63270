//! Hover construction: word targeting, candidate selection, and
//! documentation re-rendering.

use gantry_types::{CompletionItem, Hover};

fn is_word(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Locate the word under the cursor with a `[a-z0-9_]` scan
/// (case-insensitive). Returns byte offsets `(start, end)` into `line`.
/// The cursor may sit on the word or immediately after it.
#[must_use]
pub fn word_at(line: &str, column: usize) -> Option<(usize, usize)> {
    let bytes = line.as_bytes();
    let mut pos = column.min(bytes.len());
    if pos >= bytes.len() || !is_word(bytes[pos]) {
        if pos == 0 || !is_word(bytes[pos - 1]) {
            return None;
        }
        pos -= 1;
    }
    let mut start = pos;
    while start > 0 && is_word(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = pos + 1;
    while end < bytes.len() && is_word(bytes[end]) {
        end += 1;
    }
    Some((start, end))
}

/// Choose the candidate a hover describes. A word directly followed by
/// `(` is a call: the label must start with `word(`; otherwise the
/// label must equal the word exactly.
#[must_use]
pub fn select_candidate<'a>(
    items: &'a [CompletionItem],
    word: &str,
    tail: &str,
) -> Option<&'a CompletionItem> {
    if tail.starts_with('(') {
        let prefix = format!("{word}(");
        items.iter().find(|item| item.label.starts_with(&prefix))
    } else {
        items.iter().find(|item| item.label == word)
    }
}

/// Assemble hover blocks: the declaration as a fenced code block, then
/// the re-rendered documentation.
#[must_use]
pub fn build_hover(candidate: &CompletionItem) -> Hover {
    let mut blocks = Vec::new();
    if !candidate.detail.is_empty() {
        blocks.push(format!("```\n{}\n```", candidate.detail));
    }
    if let Some(docs) = &candidate.docs {
        let rendered = render_docs(docs);
        if !rendered.is_empty() {
            blocks.push(rendered);
        }
    }
    Hover { blocks }
}

/// Re-render daemon documentation for the hover card, line by line.
///
/// Fenced code blocks are kept verbatim minus the opening fence's
/// indent; hidden doctest setup lines (`# ` inside a fence) are
/// dropped. Headings are rewritten as pseudo-links — a rendered heading
/// dominates the card. Everything else passes through unchanged.
#[must_use]
pub fn render_docs(docs: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    // Indent offset of the currently open fence, if inside a block.
    let mut block_offset: Option<usize> = None;
    for line in docs.lines() {
        if let Some(offset) = block_offset {
            let dedented = strip_indent(line, offset);
            if dedented.starts_with("```") {
                out.push(dedented);
                block_offset = None;
            } else if dedented.starts_with("# ") || dedented == "#" {
                // hidden doctest setup line
            } else {
                out.push(dedented);
            }
        } else if let Some(offset) = fence_offset(line) {
            block_offset = Some(offset);
            out.push(strip_indent(line, offset));
        } else if let Some(title) = heading_title(line) {
            out.push(format!("[{title}]()"));
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

fn strip_indent(line: &str, offset: usize) -> String {
    let mut rest = line;
    let mut remaining = offset;
    while remaining > 0 {
        match rest.strip_prefix(' ') {
            Some(stripped) => rest = stripped,
            None => break,
        }
        remaining -= 1;
    }
    rest.to_string()
}

fn fence_offset(line: &str) -> Option<usize> {
    let trimmed = line.trim_start_matches(' ');
    trimmed.starts_with("```").then(|| line.len() - trimmed.len())
}

fn heading_title(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let title = trimmed.strip_prefix('#')?;
    Some(title.trim_start_matches('#').trim())
}
