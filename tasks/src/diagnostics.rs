//! Per-file diagnostic store with (range, message) deduplication.
//!
//! The build tool re-emits identical diagnostics when a crate is checked
//! under several feature combinations; the store keeps the first of each
//! pair and drops the rest. Equality is structural on range and message
//! only — a diagnostic with the same range but a different message (or
//! vice versa) is distinct and kept.

use std::collections::HashMap;
use std::path::PathBuf;

use gantry_types::Diagnostic;

#[derive(Debug, Default)]
pub struct DiagnosticsStore {
    data: HashMap<PathBuf, Vec<Diagnostic>>,
}

impl DiagnosticsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic unless an identical (range, message) pair is
    /// already present for the file. Returns whether it was kept.
    pub fn insert(&mut self, file: PathBuf, diagnostic: Diagnostic) -> bool {
        let entries = self.data.entry(file).or_default();
        let duplicate = entries
            .iter()
            .any(|d| d.range() == diagnostic.range() && d.message() == diagnostic.message());
        if duplicate {
            return false;
        }
        entries.push(diagnostic);
        true
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    /// Per-file replacement sets, files with errors first, then by path.
    #[must_use]
    pub fn into_files(self) -> Vec<(PathBuf, Vec<Diagnostic>)> {
        let mut files: Vec<(PathBuf, Vec<Diagnostic>)> = self.data.into_iter().collect();
        files.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity().is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity().is_error());
            b_has_errors.cmp(&a_has_errors).then_with(|| a.0.cmp(&b.0))
        });
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_types::{Position, Range, Severity};

    fn range(line: u32) -> Range {
        Range::new(Position::new(line, 0), Position::new(line, 5))
    }

    fn diag(line: u32, message: &str, severity: Severity) -> Diagnostic {
        Diagnostic::new(range(line), severity, message.to_string())
    }

    #[test]
    fn adding_twice_keeps_one() {
        let mut store = DiagnosticsStore::new();
        let d = diag(3, "unused import", Severity::Warning);
        assert!(store.insert(PathBuf::from("a.rs"), d.clone()));
        assert!(!store.insert(PathBuf::from("a.rs"), d));
        assert_eq!(store.total_count(), 1);
    }

    #[test]
    fn same_range_different_message_both_kept() {
        let mut store = DiagnosticsStore::new();
        assert!(store.insert(PathBuf::from("a.rs"), diag(3, "first", Severity::Error)));
        assert!(store.insert(PathBuf::from("a.rs"), diag(3, "second", Severity::Error)));
        assert_eq!(store.total_count(), 2);
    }

    #[test]
    fn same_message_different_range_both_kept() {
        let mut store = DiagnosticsStore::new();
        assert!(store.insert(PathBuf::from("a.rs"), diag(1, "oops", Severity::Error)));
        assert!(store.insert(PathBuf::from("9.rs"), diag(1, "oops", Severity::Error)));
        assert!(store.insert(PathBuf::from("a.rs"), diag(2, "oops", Severity::Error)));
        assert_eq!(store.total_count(), 3);
    }

    #[test]
    fn severity_is_not_part_of_the_key() {
        let mut store = DiagnosticsStore::new();
        assert!(store.insert(PathBuf::from("a.rs"), diag(3, "m", Severity::Error)));
        assert!(!store.insert(PathBuf::from("a.rs"), diag(3, "m", Severity::Warning)));
    }

    #[test]
    fn dedup_is_per_file() {
        let mut store = DiagnosticsStore::new();
        let d = diag(3, "dup", Severity::Warning);
        assert!(store.insert(PathBuf::from("a.rs"), d.clone()));
        assert!(store.insert(PathBuf::from("b.rs"), d));
    }

    #[test]
    fn files_with_errors_sort_first() {
        let mut store = DiagnosticsStore::new();
        store.insert(PathBuf::from("b.rs"), diag(1, "warn", Severity::Warning));
        store.insert(PathBuf::from("z.rs"), diag(1, "err", Severity::Error));
        store.insert(PathBuf::from("a.rs"), diag(1, "hint", Severity::Hint));
        let files = store.into_files();
        assert_eq!(files[0].0, PathBuf::from("z.rs"));
        assert_eq!(files[1].0, PathBuf::from("a.rs"));
        assert_eq!(files[2].0, PathBuf::from("b.rs"));
    }

    #[test]
    fn empty_store() {
        let store = DiagnosticsStore::new();
        assert!(store.is_empty());
        assert_eq!(store.total_count(), 0);
        assert!(store.into_files().is_empty());
    }
}
