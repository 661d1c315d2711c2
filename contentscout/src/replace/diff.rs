use serde::{Deserialize, Serialize};
use similar::{ChangeTag, DiffOp, TextDiff};

use crate::search::format_html;

/// A hunk of changes in a file diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    /// The 1-based starting line in the original content
    pub original_start_line: usize,
    /// The 1-based starting line in the updated content
    pub new_start_line: usize,
    pub original_lines: Vec<String>,
    pub new_lines: Vec<String>,
}

/// Line diff of one document's original and updated content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub hunks: Vec<DiffHunk>,
}

impl FileDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Renders the diff in unified format with three lines of context
    pub fn unified(&self, old_content: &str, new_content: &str) -> String {
        let old_content = format_html(old_content);
        let new_content = format_html(new_content);
        TextDiff::from_lines(&old_content, &new_content)
            .unified_diff()
            .context_radius(3)
            .header(&self.path, &self.path)
            .to_string()
    }
}

/// Diffs two versions of a document. Both sides are pretty-printed one tag
/// per line first, so single-line pages still produce readable hunks.
pub fn generate_file_diff(path: &str, old_content: &str, new_content: &str) -> FileDiff {
    let old_content = format_html(old_content).replace("\r\n", "\n");
    let new_content = format_html(new_content).replace("\r\n", "\n");

    let diff = TextDiff::from_lines(&old_content, &new_content);
    let mut hunks = Vec::new();

    for op in diff.ops() {
        let (original_start_line, new_start_line) = match *op {
            DiffOp::Equal { .. } => continue,
            DiffOp::Insert { new_index, .. } => (new_index + 1, new_index + 1),
            DiffOp::Delete { old_index, .. } => (old_index + 1, old_index + 1),
            DiffOp::Replace {
                old_index,
                new_index,
                ..
            } => (old_index + 1, new_index + 1),
        };

        let mut hunk = DiffHunk {
            original_start_line,
            new_start_line,
            original_lines: Vec::new(),
            new_lines: Vec::new(),
        };
        for change in diff.iter_changes(op) {
            let line = change.value().trim_end().to_string();
            match change.tag() {
                ChangeTag::Delete => hunk.original_lines.push(line),
                ChangeTag::Insert => hunk.new_lines.push(line),
                ChangeTag::Equal => {}
            }
        }
        hunks.push(hunk);
    }

    FileDiff {
        path: path.to_string(),
        hunks,
    }
}
