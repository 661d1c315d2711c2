//! Selective rewriting of detected matches.
//!
//! The replace pass re-runs detection over the content the scan saw, checks
//! that every selected match id still points at the same occurrence, and
//! splices replacements into the original source. Text outside the selected
//! occurrences is never re-serialized, so unselected matches and everything
//! outside the search scope survive byte for byte.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::ScoutContext;
use crate::errors::{ScoutError, ScoutResult};
use crate::pool::run_bounded;
use crate::results::{FileOutcome, FileResult, MatchRecord};
use crate::search::html::escape_text;
use crate::search::matcher::{Located, MatchEngine};
use crate::search::{Replacement, SearchConfig, SearchType};
use crate::versions::VersionManager;

mod diff;
pub use diff::{generate_file_diff, DiffHunk, FileDiff};

static GROUP_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\$|&|\d{1,2})").expect("group reference pattern is valid"));

/// One replacement within a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementTask {
    /// The match this task rewrites
    pub match_id: usize,
    /// The byte range in the original content
    pub range: Range<usize>,
    /// The text inserted in place of the range
    pub replacement_text: String,
}

/// Collects all replacements for a single file
#[derive(Debug, Clone, Default)]
pub struct FileReplacementPlan {
    /// Replacements, sorted by range start
    pub replacements: Vec<ReplacementTask>,
    /// Selected matches that could not be mapped back to the source
    pub skipped: Vec<usize>,
}

impl FileReplacementPlan {
    /// Adds a replacement task, keeping tasks sorted and disjoint
    pub fn add_replacement(&mut self, task: ReplacementTask) -> ScoutResult<()> {
        if self
            .replacements
            .iter()
            .any(|existing| task.range.start < existing.range.end && existing.range.start < task.range.end)
        {
            return Err(ScoutError::config_error(
                "Overlapping replacements are not allowed",
            ));
        }
        let insert_pos = self
            .replacements
            .binary_search_by_key(&task.range.start, |t| t.range.start)
            .unwrap_or_else(|e| e);
        self.replacements.insert(insert_pos, task);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Splices the replacements into `content`
    pub fn apply(&self, content: &str) -> String {
        let mut result = content.to_string();
        // Back to front so earlier ranges stay valid
        for task in self.replacements.iter().rev() {
            result.replace_range(task.range.clone(), &task.replacement_text);
        }
        result
    }
}

/// Result of rewriting one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub content: String,
    /// Number of matches rewritten
    pub applied: usize,
    /// Selected matches left alone because they could not be mapped back
    pub skipped: usize,
}

impl ReplaceOutcome {
    fn unchanged(content: &str) -> Self {
        Self {
            content: content.to_string(),
            applied: 0,
            skipped: 0,
        }
    }
}

/// Rewrites the selected matches of scanned files
#[derive(Debug, Clone, Default)]
pub struct ReplaceEngine {
    matcher: MatchEngine,
}

impl ReplaceEngine {
    pub fn new(matcher: MatchEngine) -> Self {
        Self { matcher }
    }

    /// Plans the rewrite of `result`'s selected matches.
    ///
    /// Content that cannot be parsed for a targeted scope yields an empty
    /// plan. A selected id that no longer identifies the same occurrence is
    /// `MatchDrift`.
    pub fn plan(&self, result: &FileResult, config: &SearchConfig) -> ScoutResult<FileReplacementPlan> {
        let found = config.fingerprint();
        if result.config_fingerprint != found {
            return Err(ScoutError::ConfigMismatch {
                expected: result.config_fingerprint,
                found,
            });
        }

        let mut plan = FileReplacementPlan::default();
        let selected: Vec<_> = result.matches.iter().filter(|m| m.selected).collect();
        if selected.is_empty() {
            return Ok(plan);
        }
        let Some(replacement) = &config.replacement else {
            return Err(ScoutError::config_error("A replacement is required"));
        };

        let regex = self.matcher.pattern(config)?;
        let template = replacement_template(replacement, config, &regex)?;
        let content = &result.original_content;
        let space = match self.matcher.search_space(content, config) {
            Ok(space) => space,
            Err(ScoutError::ParseFailed(reason)) => {
                warn!("{} left unchanged: {}", result.file.path, reason);
                return Ok(plan);
            }
            Err(e) => return Err(e),
        };
        let located = MatchEngine::locate(space.text(), &regex, Some(&template));

        for record in selected {
            let found = located
                .get(record.id)
                .filter(|found| same_occurrence(found, record))
                .ok_or_else(|| ScoutError::MatchDrift {
                    path: result.file.path.clone(),
                    id: record.id,
                })?;
            let mut replacement_text = found.replacement.clone().unwrap_or_default();
            if space.decodes_text() && *replacement != Replacement::Remove {
                replacement_text = escape_text(&replacement_text);
            }
            match space.source_range(found.range.clone()) {
                Some(range) => plan.add_replacement(ReplacementTask {
                    match_id: record.id,
                    range,
                    replacement_text,
                })?,
                None => {
                    debug!(
                        "Match {} in {} spans markup; left unchanged",
                        record.id, result.file.path
                    );
                    plan.skipped.push(record.id);
                }
            }
        }
        Ok(plan)
    }

    /// Rewrites the selected matches of `result`, returning the new content.
    /// With nothing selected the original content comes back unchanged.
    pub fn apply(&self, result: &FileResult, config: &SearchConfig) -> ScoutResult<ReplaceOutcome> {
        let plan = self.plan(result, config)?;
        if plan.is_empty() {
            return Ok(ReplaceOutcome {
                skipped: plan.skipped.len(),
                ..ReplaceOutcome::unchanged(&result.original_content)
            });
        }
        Ok(ReplaceOutcome {
            content: plan.apply(&result.original_content),
            applied: plan.replacements.len(),
            skipped: plan.skipped.len(),
        })
    }
}

fn same_occurrence(found: &Located, record: &MatchRecord) -> bool {
    found.text == record.matched_text
        && found.line_number == record.line_number
        && found.sequence_on_line == record.sequence_on_line
}

/// Builds the expansion template for `Captures::expand`.
///
/// Regular-expression replacements read `$1`..`$99`, `$&` and `$$` the way
/// JavaScript's `String.replace` does: a two-digit reference falls back to
/// one digit and a literal when the two-digit group does not exist. Every
/// other mode inserts the text literally.
fn replacement_template(replacement: &Replacement, config: &SearchConfig, regex: &Regex) -> ScoutResult<String> {
    let text = match replacement {
        Replacement::Remove if config.html_block_mode => "",
        Replacement::Remove => Replacement::EMPTY_PLACEHOLDER,
        Replacement::Text(text) => text,
    };
    if config.search_type != SearchType::RegularExpression {
        return Ok(text.replace('$', "$$"));
    }

    let group_count = regex.captures_len();
    let mut template = String::with_capacity(text.len());
    let mut last = 0;
    for caps in GROUP_REF_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        template.push_str(&text[last..whole.start()].replace('$', "$$"));
        last = whole.end();
        match &caps[1] {
            "$" => template.push_str("$$"),
            "&" => template.push_str("${0}"),
            digits => {
                let (group, rest) = group_reference(digits, group_count).ok_or_else(|| {
                    ScoutError::invalid_pattern(format!("Capture group ${} does not exist", digits))
                })?;
                template.push_str(&format!("${{{}}}{}", group, rest));
            }
        }
    }
    template.push_str(&text[last..].replace('$', "$$"));
    Ok(template)
}

/// The group a `$` reference names, and any digit left over as literal text
fn group_reference(digits: &str, group_count: usize) -> Option<(usize, &str)> {
    if digits.len() == 2 {
        if let Ok(group) = digits.parse::<usize>() {
            if group >= 1 && group < group_count {
                return Some((group, ""));
            }
        }
    }
    let (first, rest) = digits.split_at(1);
    let group: usize = first.parse().ok()?;
    (group < group_count).then_some((group, rest))
}

/// Outcome of one file in a replace batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    /// Matches rewritten
    pub replacements: usize,
    /// Whether the remote acknowledged the backup with a version record
    pub version_recorded: bool,
}

/// Per-file outcomes of a replace batch
#[derive(Debug)]
pub struct ReplaceReport {
    pub outcomes: Vec<FileOutcome<FileUpdate>>,
    /// Backups created, including those of files whose write then failed
    pub backups_created: usize,
}

impl ReplaceReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn updated(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ScoutError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.path.as_str(), e)))
    }

    /// Files whose write was skipped because no backup could be made
    pub fn skipped_for_backup(&self) -> Vec<&str> {
        self.failures()
            .filter(|(_, e)| matches!(e, ScoutError::BackupFailed { .. }))
            .map(|(path, _)| path)
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "Updated {}/{} files; created {} backups",
            self.updated(),
            self.total(),
            self.backups_created
        )
    }

    /// Explicit warning when backups failed and writes were skipped
    pub fn backup_warning(&self) -> Option<String> {
        let skipped = self.skipped_for_backup();
        (!skipped.is_empty()).then(|| {
            format!(
                "Backups could not be created for {} file(s); their writes were skipped: {}",
                skipped.len(),
                skipped.join(", ")
            )
        })
    }
}

struct WriteJob {
    slot: usize,
    index: usize,
    path: String,
    content: String,
    replacements: usize,
}

enum WriteResult {
    Written {
        content: String,
        version_recorded: bool,
    },
    WriteFailed(ScoutError),
    BackupFailed(ScoutError),
}

/// Backs up and rewrites every selected file of a scan.
///
/// Rewrites are planned for all files first; a plan error (drift) fails only
/// that file. Files then go through the worker pool: backup, and only after a
/// successful backup, write. Successful writes set `updated_content`. The
/// content cache is cleared at the end.
pub async fn replace_selected(
    ctx: &ScoutContext,
    config: &SearchConfig,
    results: &mut [FileResult],
) -> ScoutResult<ReplaceReport> {
    config.validate_for_replace()?;
    let expected = config.fingerprint();
    if let Some(stale) = results
        .iter()
        .find(|r| r.is_selected() && r.config_fingerprint != expected)
    {
        return Err(ScoutError::ConfigMismatch {
            expected: stale.config_fingerprint,
            found: expected,
        });
    }

    let engine = ReplaceEngine::new(MatchEngine::with_metrics(ctx.metrics.clone()));
    let mut outcomes: Vec<Option<FileOutcome<FileUpdate>>> = Vec::new();
    let mut jobs = Vec::new();
    for (index, result) in results.iter().enumerate().filter(|(_, r)| r.is_selected()) {
        let slot = outcomes.len();
        let path = result.file.path.as_str();
        match engine.apply(result, config) {
            Ok(outcome) if outcome.applied > 0 => {
                outcomes.push(None);
                jobs.push(WriteJob {
                    slot,
                    index,
                    path: path.to_string(),
                    content: outcome.content,
                    replacements: outcome.applied,
                });
            }
            Ok(_) => {
                debug!("{}: nothing to rewrite", path);
                outcomes.push(Some(FileOutcome::new(
                    path,
                    Ok(FileUpdate {
                        replacements: 0,
                        version_recorded: false,
                    }),
                )));
            }
            Err(e) => {
                warn!("{}", e);
                outcomes.push(Some(FileOutcome::new(path, Err(e))));
            }
        }
    }

    info!("Writing {} files", jobs.len());
    let placed: Vec<(usize, usize, String, usize)> = jobs
        .iter()
        .map(|job| (job.slot, job.index, job.path.clone(), job.replacements))
        .collect();
    let versions = VersionManager::new(ctx.api.clone());
    let api = ctx.api.clone();
    let store = ctx.store.clone();
    let label = Arc::new(ctx.backup_label.clone());
    let written = run_bounded(jobs, ctx.worker_count, &ctx.cancel, move |job: WriteJob| {
        let versions = versions.clone();
        let api = api.clone();
        let store = store.clone();
        let label = label.clone();
        async move {
            let record = match versions.backup(&job.path, &label).await {
                Ok(record) => record,
                Err(e) => return WriteResult::BackupFailed(e),
            };
            match store.write(api.as_ref(), &job.path, &job.content).await {
                Ok(()) => WriteResult::Written {
                    content: job.content,
                    version_recorded: record.is_some(),
                },
                Err(e) => WriteResult::WriteFailed(e),
            }
        }
    })
    .await;

    let mut backups_created = 0;
    for ((slot, index, path, replacements), written) in placed.into_iter().zip(written) {
        let outcome = match written {
            Some(WriteResult::Written {
                content,
                version_recorded,
            }) => {
                backups_created += 1;
                results[index].updated_content = Some(content);
                Ok(FileUpdate {
                    replacements,
                    version_recorded,
                })
            }
            Some(WriteResult::WriteFailed(e)) => {
                backups_created += 1;
                warn!("{}", e);
                Err(e)
            }
            Some(WriteResult::BackupFailed(e)) => {
                warn!("{}", e);
                Err(e)
            }
            None => Err(ScoutError::Cancelled),
        };
        outcomes[slot] = Some(FileOutcome::new(path, outcome));
    }
    ctx.store.invalidate_all();

    let report = ReplaceReport {
        outcomes: outcomes.into_iter().flatten().collect(),
        backups_created,
    };
    info!("{}", report.summary());
    if let Some(warning) = report.backup_warning() {
        warn!("{}", warning);
    }
    Ok(report)
}
