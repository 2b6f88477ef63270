//! Signature help: call-site scanning and parameter-list parsing.
//!
//! Both the declared parameter list and the user's in-progress argument
//! text go through the same balanced-parenthesis, comma-split scanner:
//! commas at the top level separate parameters, nested parens pass
//! through verbatim as part of the current piece.

use gantry_types::SignatureHelp;

/// The nearest enclosing unclosed `(` to the left of the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Byte index of the `(` in the scanned text.
    pub open: usize,
}

/// Scan backward from the cursor, tracking parenthesis depth. A `{`
/// encountered before any unclosed `(` means the cursor is not inside a
/// call expression — no signature help.
#[must_use]
pub fn enclosing_call(before_cursor: &str) -> Option<CallSite> {
    let mut depth = 0usize;
    for (idx, byte) in before_cursor.bytes().enumerate().rev() {
        match byte {
            b')' => depth += 1,
            b'(' if depth == 0 => return Some(CallSite { open: idx }),
            b'(' => depth -= 1,
            b'{' if depth == 0 => return None,
            _ => {}
        }
    }
    None
}

/// Split `text` on commas at parenthesis depth zero, preserving each
/// piece verbatim. Always returns at least one piece.
#[must_use]
pub fn split_top_level(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => pieces.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    pieces.push(current);
    pieces
}

/// Extract the declared parameter list from a signature: the text
/// between the first `(` and its matching `)`, comma-split at the top
/// level. `None` when the declaration has no parameter list at all.
#[must_use]
pub fn parameter_list(declaration: &str) -> Option<Vec<String>> {
    let open = declaration.find('(')?;
    let inner_start = open + 1;
    let mut depth = 0usize;
    for (idx, c) in declaration[inner_start..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => {
                let inner = &declaration[inner_start..inner_start + idx];
                if inner.trim().is_empty() {
                    return Some(Vec::new());
                }
                return Some(split_top_level(inner));
            }
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Index of the parameter under construction: the count of top-level
/// commas typed so far.
#[must_use]
pub fn active_parameter(args: &str) -> usize {
    split_top_level(args).len().saturating_sub(1)
}

/// Assemble signature help for `callee` from its declaration and the
/// in-progress argument text.
///
/// When the declaration carries exactly one more parameter than the
/// call site supplies, the first declared parameter is an implicit
/// receiver the caller never types, and is dropped.
#[must_use]
pub fn build_signature(declaration: &str, args: &str) -> Option<SignatureHelp> {
    let mut parameters = parameter_list(declaration)?;
    let provided = split_top_level(args).len();
    if parameters.len() == provided + 1 {
        parameters.remove(0);
    }
    let parameters: Vec<String> = parameters
        .iter()
        .map(|parameter| parameter.trim().to_string())
        .collect();
    Some(SignatureHelp {
        label: declaration.to_string(),
        parameters,
        active_parameter: active_parameter(args),
    })
}
