use futures::future::{join_all, BoxFuture, FutureExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::AdminApi;
use crate::config::OrgSite;
use crate::errors::{ScoutError, ScoutResult};
use crate::filters::{should_descend, should_include_file};
use crate::results::FileDescriptor;

/// How discovery walks and filters the content tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub recurse_subfolders: bool,
    pub exclude_path_fragments: Vec<String>,
    pub modified_since: Option<SystemTime>,
    /// Keep only this extension; `None` keeps every file with an extension
    pub only_extension: Option<String>,
    /// Wall-clock limit for the whole crawl
    pub timeout: Option<Duration>,
}

/// Discovery progress, reported after each folder listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryProgress {
    pub folders_listed: usize,
    pub files_found: usize,
}

pub type ProgressFn = Arc<dyn Fn(DiscoveryProgress) + Send + Sync>;

/// The files a crawl produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    /// Candidate files, deduplicated by path, in listing order
    pub files: Vec<FileDescriptor>,
    /// Folders whose listing failed; they contributed no files
    pub failed_folders: Vec<String>,
    /// Whether the cancel signal stopped the crawl early
    pub cancelled: bool,
}

impl Discovered {
    fn merge(&mut self, other: Discovered) {
        self.files.extend(other.files);
        self.failed_folders.extend(other.failed_folders);
        self.cancelled |= other.cancelled;
    }
}

/// Enumerates candidate files under one or more folders
pub struct Discovery<'a> {
    api: &'a dyn AdminApi,
    org_site: &'a OrgSite,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
    folders_listed: AtomicUsize,
    files_found: AtomicUsize,
}

impl<'a> Discovery<'a> {
    pub fn new(api: &'a dyn AdminApi, org_site: &'a OrgSite) -> Self {
        Self {
            api,
            org_site,
            cancel: CancellationToken::new(),
            progress: None,
            folders_listed: AtomicUsize::new(0),
            files_found: AtomicUsize::new(0),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Lists every candidate file under `roots` (site-relative; empty means
    /// the whole site).
    ///
    /// A failing subfolder listing is logged and skipped. Running past the
    /// configured timeout fails the whole crawl.
    pub async fn enumerate(
        &self,
        roots: &[String],
        options: &DiscoveryOptions,
    ) -> ScoutResult<Discovered> {
        let mut seen_roots = HashSet::new();
        let roots: Vec<String> = if roots.is_empty() {
            vec![self.org_site.prefix()]
        } else {
            roots
                .iter()
                .map(|root| self.org_site.full_path(root.trim()))
                .filter(|root| seen_roots.insert(root.clone()))
                .collect()
        };
        info!("Discovering files under {:?}", roots);

        let crawl = join_all(
            roots
                .into_iter()
                .map(|root| self.list_folder(root, options)),
        );
        let listings = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, crawl)
                .await
                .map_err(|_| ScoutError::Timeout(limit))?,
            None => crawl.await,
        };

        let mut discovered = Discovered::default();
        for listing in listings {
            discovered.merge(listing);
        }

        let mut seen = HashSet::new();
        discovered.files.retain(|file| seen.insert(file.path.clone()));
        info!(
            "Discovered {} files ({} folder listings failed{})",
            discovered.files.len(),
            discovered.failed_folders.len(),
            if discovered.cancelled { ", cancelled" } else { "" }
        );
        Ok(discovered)
    }

    fn list_folder<'s>(&'s self, path: String, options: &'s DiscoveryOptions) -> BoxFuture<'s, Discovered> {
        async move {
            if self.cancel.is_cancelled() {
                return Discovered {
                    cancelled: true,
                    ..Discovered::default()
                };
            }

            let entries = match self.api.list(&path).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Listing skipped: {}", e);
                    return Discovered {
                        failed_folders: vec![path],
                        ..Discovered::default()
                    };
                }
            };

            let mut listing = Discovered {
                files: entries
                    .iter()
                    .filter(|entry| {
                        should_include_file(
                            entry,
                            options.only_extension.as_deref(),
                            &options.exclude_path_fragments,
                            options.modified_since,
                        )
                    })
                    .map(|entry| entry.to_descriptor())
                    .collect(),
                ..Discovered::default()
            };
            debug!("{}: {} candidate files", path, listing.files.len());
            self.report(listing.files.len());

            if options.recurse_subfolders {
                let subfolders = entries
                    .iter()
                    .filter(|entry| should_descend(entry, &options.exclude_path_fragments))
                    .map(|entry| self.list_folder(entry.path.clone(), options));
                for sub in join_all(subfolders).await {
                    listing.merge(sub);
                }
            }
            listing
        }
        .boxed()
    }

    fn report(&self, new_files: usize) {
        let folders_listed = self.folders_listed.fetch_add(1, Ordering::Relaxed) + 1;
        let files_found = self.files_found.fetch_add(new_files, Ordering::Relaxed) + new_files;
        if let Some(progress) = &self.progress {
            progress(DiscoveryProgress {
                folders_listed,
                files_found,
            });
        }
    }
}
