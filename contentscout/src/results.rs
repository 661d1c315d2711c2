//! Scan result types: the files a crawl produced and the matches found in them.
//!
//! A `FileResult` owns everything the replace pass needs later (the content it
//! was scanned against, the matches and the fingerprint of the search that
//! produced them), so a scan can be saved, edited and replayed without going
//! back to the remote store.

use serde::{Deserialize, Serialize};

use crate::errors::{ScoutError, ScoutResult};

/// A file produced by discovery. Identified by `path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Full content path, `/org/site/folder/page.html`
    pub path: String,
    /// Extension without the dot, if the entry has one
    pub extension: Option<String>,
    /// Last modification, seconds since the Unix epoch
    pub last_modified: Option<u64>,
    /// File name as listed
    pub name: String,
}

impl FileDescriptor {
    /// The last path segment (used for reporting and export file names)
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// The tuple that distinguishes one occurrence from another on the same line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchIdentity {
    pub matched_text: String,
    pub line_number: usize,
    pub sequence_on_line: usize,
}

/// A single located occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Stable id assigned at detection: the ordinal of this match in its file
    pub id: usize,
    /// The text that matched
    pub matched_text: String,
    /// Offset of the match in the text that was searched
    pub byte_offset: usize,
    /// 1-based line in the text that was searched
    pub line_number: usize,
    /// 1-based ordinal among the matches on the same line
    pub sequence_on_line: usize,
    /// Surrounding text for display
    pub context_snippet: String,
    /// Whether the replace pass should rewrite this match
    pub selected: bool,
}

impl MatchRecord {
    pub fn identity(&self) -> MatchIdentity {
        MatchIdentity {
            matched_text: self.matched_text.clone(),
            line_number: self.line_number,
            sequence_on_line: self.sequence_on_line,
        }
    }

    /// A synthetic whole-file match (blank page, JSON file)
    pub(crate) fn synthetic(text: &str, context: &str) -> Self {
        Self {
            id: 0,
            matched_text: text.to_string(),
            byte_offset: 0,
            line_number: 1,
            sequence_on_line: 1,
            context_snippet: context.to_string(),
            selected: true,
        }
    }
}

/// Aggregate selection state of a file's matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    All,
    Partial,
    None,
}

/// All matches found in a single file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub file: FileDescriptor,
    pub matches: Vec<MatchRecord>,
    /// The content the matches were computed against
    pub original_content: String,
    /// Content after a successful replace
    #[serde(default)]
    pub updated_content: Option<String>,
    /// Display state only
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub is_blank_page: bool,
    #[serde(default)]
    pub is_json_file: bool,
    /// Number of structural elements found in element-only discovery
    #[serde(default)]
    pub element_count: usize,
    /// Fingerprint of the search configuration that produced `matches`
    pub config_fingerprint: u64,
}

impl FileResult {
    pub fn selection(&self) -> SelectionState {
        let selected = self.selected_count();
        if selected == 0 {
            SelectionState::None
        } else if selected == self.matches.len() {
            SelectionState::All
        } else {
            SelectionState::Partial
        }
    }

    /// A file counts as selected when any of its matches is
    pub fn is_selected(&self) -> bool {
        self.matches.iter().any(|m| m.selected)
    }

    pub fn selected_count(&self) -> usize {
        self.matches.iter().filter(|m| m.selected).count()
    }

    pub fn set_all_selected(&mut self, selected: bool) {
        for m in &mut self.matches {
            m.selected = selected;
        }
    }

    /// The content an export or preview should show
    pub fn current_content(&self) -> &str {
        self.updated_content
            .as_deref()
            .unwrap_or(&self.original_content)
    }
}

/// Totals for one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Files discovered and attempted
    pub files_scanned: usize,
    /// Files that produced a result
    pub files_affected: usize,
    /// Matches across all results
    pub matches_found: usize,
    /// Files whose content could not be fetched
    pub fetch_failures: usize,
    /// Whether the scan stopped early on a cancel signal
    pub cancelled: bool,
}

impl ScanSummary {
    /// Adds a file result to the totals
    pub fn record(&mut self, result: &FileResult) {
        self.files_affected += 1;
        self.matches_found += result.matches.len();
    }
}

/// What happened to one file in a batch operation
#[derive(Debug)]
pub struct FileOutcome<T> {
    pub path: String,
    pub result: ScoutResult<T>,
}

impl<T> FileOutcome<T> {
    pub fn new(path: impl Into<String>, result: ScoutResult<T>) -> Self {
        Self {
            path: path.into(),
            result,
        }
    }

    /// Outcome for a file the batch never reached
    pub fn cancelled(path: impl Into<String>) -> Self {
        Self::new(path, Err(ScoutError::Cancelled))
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-file outcomes of a batch; one file's failure never hides another's result
#[derive(Debug)]
pub struct BatchReport<T> {
    pub outcomes: Vec<FileOutcome<T>>,
}

impl<T> BatchReport<T> {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn successes(&self) -> impl Iterator<Item = (&str, &T)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|value| (o.path.as_str(), value)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ScoutError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.path.as_str(), e)))
    }

    pub fn failed_paths(&self) -> Vec<&str> {
        self.failures().map(|(path, _)| path).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: usize, text: &str, line: usize, seq: usize) -> MatchRecord {
        MatchRecord {
            id,
            matched_text: text.to_string(),
            byte_offset: 0,
            line_number: line,
            sequence_on_line: seq,
            context_snippet: String::new(),
            selected: true,
        }
    }

    fn file_result(matches: Vec<MatchRecord>) -> FileResult {
        FileResult {
            file: FileDescriptor {
                path: "/acme/site/blog/post.html".to_string(),
                extension: Some("html".to_string()),
                last_modified: Some(1_700_000_000),
                name: "post.html".to_string(),
            },
            matches,
            original_content: "<p>Hello</p>".to_string(),
            updated_content: None,
            expanded: false,
            is_blank_page: false,
            is_json_file: false,
            element_count: 0,
            config_fingerprint: 0,
        }
    }

    #[test]
    fn test_selection_state() {
        let mut result = file_result(vec![record(0, "a", 1, 1), record(1, "a", 1, 2)]);
        assert_eq!(result.selection(), SelectionState::All);
        assert!(result.is_selected());

        result.matches[1].selected = false;
        assert_eq!(result.selection(), SelectionState::Partial);
        assert_eq!(result.selected_count(), 1);

        result.set_all_selected(false);
        assert_eq!(result.selection(), SelectionState::None);
        assert!(!result.is_selected());
    }

    #[test]
    fn test_identity_distinguishes_sequence() {
        let first = record(0, "Hello", 3, 1);
        let second = record(1, "Hello", 3, 2);
        assert_ne!(first.identity(), second.identity());
        assert_eq!(first.identity(), record(7, "Hello", 3, 1).identity());
    }

    #[test]
    fn test_current_content_prefers_update() {
        let mut result = file_result(vec![]);
        assert_eq!(result.current_content(), "<p>Hello</p>");
        result.updated_content = Some("<p>Hi</p>".to_string());
        assert_eq!(result.current_content(), "<p>Hi</p>");
        assert_eq!(result.file.file_name(), "post.html");
    }

    #[test]
    fn test_summary_record() {
        let mut summary = ScanSummary::default();
        summary.record(&file_result(vec![record(0, "a", 1, 1), record(1, "b", 2, 1)]));
        summary.record(&file_result(vec![record(0, "a", 1, 1)]));
        assert_eq!(summary.files_affected, 2);
        assert_eq!(summary.matches_found, 3);
    }

    #[test]
    fn test_batch_report_counts() {
        let report = BatchReport {
            outcomes: vec![
                FileOutcome::new("/a", Ok(1)),
                FileOutcome::new("/b", Err(ScoutError::backup_failed("/b"))),
                FileOutcome::cancelled("/c"),
            ],
        };
        assert_eq!(report.total(), 3);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed_paths(), vec!["/b", "/c"]);
        assert_eq!(report.successes().collect::<Vec<_>>(), vec![("/a", &1)]);
    }
}
