use dashmap::DashMap;
use tracing::{debug, warn};

use crate::api::AdminApi;
use crate::errors::ScoutResult;
use crate::metrics::ScanMetrics;

/// Result of reading a document.
///
/// A failed fetch is a value, not an error: "could not read the page" must
/// stay distinguishable from "read an empty page".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(String),
    Failed(String),
}

impl FetchOutcome {
    pub fn content(&self) -> Option<&str> {
        match self {
            FetchOutcome::Fetched(content) => Some(content),
            FetchOutcome::Failed(_) => None,
        }
    }
}

/// Reads and writes document sources, caching reads by path.
///
/// The cache is cleared wholesale after any mutating batch so the next scan
/// sees authoritative remote state.
#[derive(Debug, Default)]
pub struct ContentStore {
    cache: DashMap<String, String>,
    metrics: ScanMetrics,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: ScanMetrics) -> Self {
        Self {
            cache: DashMap::new(),
            metrics,
        }
    }

    pub async fn read(&self, api: &dyn AdminApi, path: &str, use_cache: bool) -> FetchOutcome {
        if use_cache {
            if let Some(content) = self.cache.get(path) {
                self.metrics.record_cache_lookup(true);
                return FetchOutcome::Fetched(content.clone());
            }
            self.metrics.record_cache_lookup(false);
        }

        match api.read_source(path).await {
            Ok(content) => {
                debug!("Fetched {} ({} bytes)", path, content.len());
                self.metrics.record_fetch(content.len() as u64);
                if use_cache {
                    self.cache.insert(path.to_string(), content.clone());
                }
                FetchOutcome::Fetched(content)
            }
            Err(e) => {
                warn!("{}", e);
                self.metrics.record_fetch_failure();
                FetchOutcome::Failed(e.to_string())
            }
        }
    }

    pub async fn write(&self, api: &dyn AdminApi, path: &str, content: &str) -> ScoutResult<()> {
        api.write_source(path, content).await?;
        debug!("Wrote {} ({} bytes)", path, content.len());
        Ok(())
    }

    pub fn invalidate_all(&self) {
        debug!("Clearing {} cached documents", self.cache.len());
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
