use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::{AdminApi, HttpAdminApi};
use crate::config::{OrgSite, ScoutConfig};
use crate::errors::ScoutResult;
use crate::metrics::ScanMetrics;
use crate::store::ContentStore;

/// Everything a scan, replace, revert or bulk call works against.
///
/// One context is shared by all operations of an invocation; the content
/// cache it owns is the only state carried between them.
#[derive(Clone)]
pub struct ScoutContext {
    pub api: Arc<dyn AdminApi>,
    pub store: Arc<ContentStore>,
    pub org_site: OrgSite,
    /// Branch used for preview requests and preview URLs
    pub branch: String,
    pub metrics: ScanMetrics,
    /// Remote calls in flight at once during scans, writes and reverts
    pub worker_count: usize,
    pub backup_label: String,
    pub cancel: CancellationToken,
}

impl ScoutContext {
    pub fn new(api: Arc<dyn AdminApi>, org_site: OrgSite) -> Self {
        let metrics = ScanMetrics::new();
        let defaults = ScoutConfig::default();
        Self {
            api,
            store: Arc::new(ContentStore::with_metrics(metrics.clone())),
            org_site,
            branch: defaults.branch,
            metrics,
            worker_count: defaults.worker_count.get(),
            backup_label: defaults.backup_label,
            cancel: CancellationToken::new(),
        }
    }

    /// A context talking HTTP to the endpoints in `config`
    pub fn from_config(config: &ScoutConfig, token: &str) -> ScoutResult<Self> {
        let org_site = config.org_site()?;
        let api = HttpAdminApi::new(
            config.api.clone(),
            org_site.clone(),
            config.branch.clone(),
            token,
            config.request_timeout()?,
        )?;
        Ok(Self::new(Arc::new(api), org_site).configured(config))
    }

    /// Applies the tuning fields of `config`
    pub fn configured(mut self, config: &ScoutConfig) -> Self {
        self.branch = config.branch.clone();
        self.worker_count = config.worker_count.get();
        self.backup_label = config.backup_label.clone();
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl std::fmt::Debug for ScoutContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoutContext")
            .field("org_site", &self.org_site)
            .field("branch", &self.branch)
            .field("worker_count", &self.worker_count)
            .finish_non_exhaustive()
    }
}
