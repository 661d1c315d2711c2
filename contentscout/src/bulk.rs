//! Lifecycle transitions over a selected file set.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{BulkResponse, LifecycleOp};
use crate::config::OrgSite;
use crate::context::ScoutContext;
use crate::errors::{ScoutError, ScoutResult};
use crate::pool::run_bounded;
use crate::results::{BatchReport, FileOutcome};

/// A bulk action on selected files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BulkOperation {
    Preview,
    Publish,
    Unpublish,
    /// Builds preview URLs locally; no remote call
    CopyUrls,
}

impl BulkOperation {
    fn lifecycle(self) -> Option<LifecycleOp> {
        match self {
            BulkOperation::Preview => Some(LifecycleOp::Preview),
            BulkOperation::Publish => Some(LifecycleOp::Publish),
            BulkOperation::Unpublish => Some(LifecycleOp::Unpublish),
            BulkOperation::CopyUrls => None,
        }
    }
}

/// What a bulk action did
#[derive(Debug)]
pub enum BulkReport {
    Urls(Vec<String>),
    /// One file, one direct call
    Single {
        op: LifecycleOp,
        path: String,
        result: ScoutResult<()>,
    },
    /// Several files, one batched call
    Batch {
        op: LifecycleOp,
        count: usize,
        result: ScoutResult<BulkResponse>,
    },
    /// Per-file unpublish calls
    Unpublished(BatchReport<()>),
}

impl BulkReport {
    pub fn is_success(&self) -> bool {
        match self {
            BulkReport::Urls(_) => true,
            BulkReport::Single { result, .. } => result.is_ok(),
            BulkReport::Batch { result, .. } => result.is_ok(),
            BulkReport::Unpublished(report) => report.succeeded() == report.total(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            BulkReport::Urls(urls) => format!("Copied {} preview URLs", urls.len()),
            BulkReport::Single { op, path, result } => match result {
                Ok(()) => format!("{} succeeded for {}", capitalized(*op), path),
                Err(e) => format!("{} failed for {}: {}", capitalized(*op), path, e),
            },
            BulkReport::Batch { op, count, result } => match result {
                Ok(BulkResponse::Completed) => format!("{} completed for {} files", capitalized(*op), count),
                Ok(BulkResponse::JobStarted { name }) => {
                    format!("{} job {} started for {} files", capitalized(*op), name, count)
                }
                Err(e) => format!("Bulk {} failed: {}", op, e),
            },
            BulkReport::Unpublished(report) => {
                let mut summary = format!("Unpublished {}/{} files", report.succeeded(), report.total());
                let failed = report.failed_paths();
                if !failed.is_empty() {
                    summary.push_str(&format!("; failed: {}", failed.join(", ")));
                }
                summary
            }
        }
    }
}

fn capitalized(op: LifecycleOp) -> &'static str {
    match op {
        LifecycleOp::Preview => "Preview",
        LifecycleOp::Publish => "Publish",
        LifecycleOp::Unpublish => "Unpublish",
    }
}

/// Site-relative logical path for lifecycle calls: the org/site prefix and a
/// trailing `.html` are dropped. Other extensions are kept.
pub fn lifecycle_path(org_site: &OrgSite, full_path: &str) -> String {
    let relative = org_site.relative_path(full_path);
    let relative = relative.strip_suffix(".html").unwrap_or(relative);
    if relative.starts_with('/') {
        relative.to_string()
    } else {
        format!("/{}", relative)
    }
}

/// Public preview URL of a document on `branch`
pub fn preview_url(org_site: &OrgSite, branch: &str, full_path: &str) -> String {
    format!(
        "{}{}",
        org_site.preview_origin(branch),
        lifecycle_path(org_site, full_path)
    )
}

/// Runs a bulk action over full content paths.
///
/// One file goes through the single-item endpoint and several through one
/// batched call whose job, if any, is reported but not polled. Unpublish has
/// no batched form and always runs per file through the worker pool.
pub async fn transition(
    ctx: &ScoutContext,
    operation: BulkOperation,
    paths: &[String],
) -> ScoutResult<BulkReport> {
    if paths.is_empty() {
        return Err(ScoutError::config_error("No files selected"));
    }

    let Some(op) = operation.lifecycle() else {
        let urls = paths
            .iter()
            .map(|path| preview_url(&ctx.org_site, &ctx.branch, path))
            .collect();
        return Ok(BulkReport::Urls(urls));
    };

    let logical: Vec<String> = paths
        .iter()
        .map(|path| lifecycle_path(&ctx.org_site, path))
        .collect();
    info!("Running {} on {} files", op, logical.len());

    let report = match (op, logical.as_slice()) {
        (LifecycleOp::Unpublish, _) => BulkReport::Unpublished(unpublish_each(ctx, logical).await),
        (_, [single]) => BulkReport::Single {
            op,
            path: single.clone(),
            result: ctx.api.lifecycle(op, single).await,
        },
        (_, many) => BulkReport::Batch {
            op,
            count: many.len(),
            result: ctx.api.bulk_lifecycle(op, many).await,
        },
    };

    if report.is_success() {
        info!("{}", report.summary());
    } else {
        warn!("{}", report.summary());
    }
    Ok(report)
}

async fn unpublish_each(ctx: &ScoutContext, paths: Vec<String>) -> BatchReport<()> {
    let api = ctx.api.clone();
    let results = run_bounded(paths.clone(), ctx.worker_count, &ctx.cancel, move |path: String| {
        let api = api.clone();
        async move { api.unpublish(&path).await }
    })
    .await;

    BatchReport {
        outcomes: paths
            .into_iter()
            .zip(results)
            .map(|(path, result)| match result {
                Some(result) => FileOutcome::new(path, result),
                None => FileOutcome::cancelled(path),
            })
            .collect(),
    }
}
