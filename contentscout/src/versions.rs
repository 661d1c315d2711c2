//! Backups and revert.
//!
//! Every write goes through [`VersionManager::backup`] first; a file whose
//! backup fails is never written. Revert restores the newest labeled version
//! and backs up the state it replaces, so a revert can itself be reverted.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{AdminApi, VersionRecord};
use crate::context::ScoutContext;
use crate::errors::{ScoutError, ScoutResult};
use crate::pool::run_bounded;
use crate::results::{BatchReport, FileOutcome};

/// Outcome of reverting a batch: the version each file was restored to
pub type RevertReport = BatchReport<VersionRecord>;

/// Creates, lists and restores versions of documents
#[derive(Clone)]
pub struct VersionManager {
    api: Arc<dyn AdminApi>,
}

impl VersionManager {
    pub fn new(api: Arc<dyn AdminApi>) -> Self {
        Self { api }
    }

    /// Snapshots the current remote state of `path` under `label`.
    ///
    /// Any failure is reported as `BackupFailed` so callers can skip the write.
    pub async fn backup(&self, path: &str, label: &str) -> ScoutResult<Option<VersionRecord>> {
        match self.api.create_version(path, label).await {
            Ok(record) => {
                debug!("Backed up {} as {:?}", path, label);
                Ok(record)
            }
            Err(e @ ScoutError::BackupFailed { .. }) => Err(e),
            Err(e) => {
                warn!("Backup of {} failed: {}", path, e);
                Err(ScoutError::backup_failed(path))
            }
        }
    }

    /// Labeled versions of `path`, newest first. Anonymous autosaves are left out.
    pub async fn labeled_versions(&self, path: &str) -> ScoutResult<Vec<VersionRecord>> {
        let mut versions: Vec<VersionRecord> = self
            .api
            .list_versions(path)
            .await?
            .into_iter()
            .filter(VersionRecord::is_labeled)
            .collect();
        versions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(versions)
    }

    /// Restores the newest labeled version of `path`.
    ///
    /// Lists the versions, reads the newest labeled one, backs up the current
    /// state as `Revert(<label>)` and writes the version content back. Any
    /// failing step aborts this file with `RevertFailed`.
    pub async fn revert_to_latest(&self, path: &str) -> ScoutResult<VersionRecord> {
        let failed = |reason: String| ScoutError::revert_failed(path, reason);

        let latest = self
            .labeled_versions(path)
            .await
            .map_err(|e| failed(format!("could not list versions: {}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| failed("no labeled versions found".to_string()))?;
        let (Some(url), Some(label)) = (latest.url.as_deref(), latest.label.as_deref()) else {
            return Err(failed("version has no url".to_string()));
        };

        let content = self
            .api
            .read_version(url)
            .await
            .map_err(|e| failed(format!("could not read version {}: {}", label, e)))?;

        let revert_label = format!("Revert({})", label);
        self.backup(path, &revert_label)
            .await
            .map_err(|e| failed(e.to_string()))?;

        self.api
            .write_source(path, &content)
            .await
            .map_err(|e| failed(format!("could not write restored content: {}", e)))?;

        info!("Reverted {} to {:?}", path, label);
        Ok(latest)
    }
}

/// Reverts every path to its newest labeled version.
///
/// Files run through the worker pool; one file failing never stops the others.
/// The content cache is cleared afterwards.
pub async fn revert_all(ctx: &ScoutContext, paths: &[String]) -> RevertReport {
    info!("Reverting {} files", paths.len());
    let manager = VersionManager::new(ctx.api.clone());
    let results = run_bounded(paths.to_vec(), ctx.worker_count, &ctx.cancel, move |path: String| {
        let manager = manager.clone();
        async move { manager.revert_to_latest(&path).await }
    })
    .await;
    ctx.store.invalidate_all();

    let outcomes: Vec<FileOutcome<VersionRecord>> = paths
        .iter()
        .zip(results)
        .map(|(path, result)| match result {
            Some(result) => {
                if let Err(e) = &result {
                    warn!("{}", e);
                }
                FileOutcome::new(path.as_str(), result)
            }
            None => FileOutcome::cancelled(path.as_str()),
        })
        .collect();

    let report = RevertReport { outcomes };
    info!("Reverted {}/{} files", report.succeeded(), report.total());
    report
}
