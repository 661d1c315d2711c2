use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::context::ScoutContext;
use crate::errors::{ScoutError, ScoutResult};
use crate::replace::{replace_selected, ReplaceReport};
use crate::results::{FileResult, MatchRecord, ScanSummary};
use crate::search::SearchConfig;

pub const DEFAULT_RESULTS_PER_PAGE: usize = 10;

/// One page of the filtered result view
#[derive(Debug)]
pub struct ResultPage<'a> {
    pub items: Vec<&'a FileResult>,
    /// 1-based
    pub page: usize,
    pub total_pages: usize,
    pub total_results: usize,
}

/// The results of one scan plus the view state over them.
///
/// A session is owned by whoever drives the scan; nothing about it is global.
/// Starting a new scan means [`ScanSession::reset`] or a fresh session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSession {
    pub config: SearchConfig,
    pub results: Vec<FileResult>,
    pub summary: ScanSummary,
    #[serde(default)]
    filter: String,
    #[serde(default = "default_per_page")]
    per_page: usize,
}

fn default_per_page() -> usize {
    DEFAULT_RESULTS_PER_PAGE
}

impl ScanSession {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            results: Vec::new(),
            summary: ScanSummary::default(),
            filter: String::new(),
            per_page: DEFAULT_RESULTS_PER_PAGE,
        }
    }

    /// Drops all results and view state, keeping the page size
    pub fn reset(&mut self, config: SearchConfig) {
        debug!("Resetting session with {} results", self.results.len());
        *self = Self {
            per_page: self.per_page,
            ..Self::new(config)
        };
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn select_all(&mut self) {
        self.results.iter_mut().for_each(|r| r.set_all_selected(true));
    }

    pub fn deselect_all(&mut self) {
        self.results.iter_mut().for_each(|r| r.set_all_selected(false));
    }

    /// Selects or deselects every match of one file (by result index)
    pub fn set_file_selected(&mut self, file: usize, selected: bool) -> ScoutResult<()> {
        self.result_mut(file)?.set_all_selected(selected);
        Ok(())
    }

    /// Flips one match and returns its new state
    pub fn toggle(&mut self, file: usize, match_id: usize) -> ScoutResult<bool> {
        let record = self.match_mut(file, match_id)?;
        record.selected = !record.selected;
        Ok(record.selected)
    }

    pub fn set_match_selected(&mut self, file: usize, match_id: usize, selected: bool) -> ScoutResult<()> {
        self.match_mut(file, match_id)?.selected = selected;
        Ok(())
    }

    fn match_mut(&mut self, file: usize, match_id: usize) -> ScoutResult<&mut MatchRecord> {
        let result = self.result_mut(file)?;
        let path = result.file.path.clone();
        result
            .matches
            .iter_mut()
            .find(|m| m.id == match_id)
            .ok_or_else(|| ScoutError::config_error(format!("{} has no match {}", path, match_id)))
    }

    /// Index of the result for a full content path
    pub fn position(&self, path: &str) -> Option<usize> {
        self.results.iter().position(|r| r.file.path == path)
    }

    fn result_mut(&mut self, file: usize) -> ScoutResult<&mut FileResult> {
        let len = self.results.len();
        self.results
            .get_mut(file)
            .ok_or_else(|| ScoutError::config_error(format!("No result {} (have {})", file, len)))
    }

    /// Paths of results with at least one selected match
    pub fn selected_paths(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.is_selected())
            .map(|r| r.file.path.clone())
            .collect()
    }

    /// Narrows the view to results whose path, matched text or context
    /// contains `text`, ignoring case. An empty filter shows everything.
    pub fn set_filter(&mut self, text: &str) {
        self.filter = text.trim().to_lowercase();
    }

    pub fn filtered(&self) -> Vec<&FileResult> {
        if self.filter.is_empty() {
            return self.results.iter().collect();
        }
        let needle = self.filter.as_str();
        self.results
            .iter()
            .filter(|r| {
                r.file.path.to_lowercase().contains(needle)
                    || r.matches.iter().any(|m| {
                        m.matched_text.to_lowercase().contains(needle)
                            || m.context_snippet.to_lowercase().contains(needle)
                    })
            })
            .collect()
    }

    /// The `page`-th page (1-based, clamped) of the filtered view
    pub fn page(&self, page: usize) -> ResultPage<'_> {
        let filtered = self.filtered();
        let total_results = filtered.len();
        let total_pages = total_results.div_ceil(self.per_page);
        let page = page.clamp(1, total_pages.max(1));
        let items = filtered
            .into_iter()
            .skip((page - 1) * self.per_page)
            .take(self.per_page)
            .collect();
        ResultPage {
            items,
            page,
            total_pages,
            total_results,
        }
    }

    /// Rewrites the selected matches; see [`replace_selected`]
    pub async fn replace(&mut self, ctx: &ScoutContext) -> ScoutResult<ReplaceReport> {
        replace_selected(ctx, &self.config, &mut self.results).await
    }

    pub fn save(&self, path: &Path) -> ScoutResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Saved {} results to {}", self.results.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> ScoutResult<Self> {
        let json = fs::read_to_string(path)?;
        let mut session: Self = serde_json::from_str(&json)?;
        session.per_page = session.per_page.max(1);
        debug!("Loaded {} results from {}", session.results.len(), path.display());
        Ok(session)
    }
}
