//! Normalized diagnostic model.
//!
//! Positions are 0-based on both axes; external tools that emit 1-based
//! coordinates are converted at the parsing boundary, never here.

use serde::Serialize;

/// A 0-based line/column position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A half-open source range between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Hint => "hint",
        }
    }
}

/// A single normalized diagnostic.
///
/// Fields are private; construction goes through [`Diagnostic::new`] and
/// consumers read via accessors. File association is external —
/// diagnostics travel as `(PathBuf, Vec<Diagnostic>)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    range: Range,
    severity: Severity,
    /// Possibly multi-line; child notes are flattened in by the parser
    /// with indentation proportional to nesting depth.
    message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(range: Range, severity: Severity, message: String) -> Self {
        Self {
            range,
            severity,
            message,
        }
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Format as `path:line:col: severity: message` (1-based for display).
    #[must_use]
    pub fn display_with_path(&self, path: &std::path::Path) -> String {
        format!(
            "{}:{}:{}: {}: {}",
            path.display(),
            self.range.start.line + 1,
            self.range.start.column + 1,
            self.severity.label(),
            self.message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn range(line: u32, column: u32) -> Range {
        Range::new(Position::new(line, column), Position::new(line, column + 1))
    }

    #[test]
    fn severity_labels() {
        assert_eq!(Severity::Error.label(), "error");
        assert_eq!(Severity::Warning.label(), "warning");
        assert_eq!(Severity::Info.label(), "info");
        assert_eq!(Severity::Hint.label(), "hint");
    }

    #[test]
    fn is_error_only_for_errors() {
        assert!(Severity::Error.is_error());
        assert!(!Severity::Warning.is_error());
        assert!(!Severity::Info.is_error());
        assert!(!Severity::Hint.is_error());
    }

    #[test]
    fn display_with_path_is_one_based() {
        let diag = Diagnostic::new(range(10, 5), Severity::Error, "expected `;`".to_string());
        let path = PathBuf::from("src/main.rs");
        assert_eq!(
            diag.display_with_path(&path),
            "src/main.rs:11:6: error: expected `;`"
        );
    }

    #[test]
    fn ranges_compare_structurally() {
        assert_eq!(range(1, 2), range(1, 2));
        assert_ne!(range(1, 2), range(1, 3));
    }
}
