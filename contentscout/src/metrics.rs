use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters for one scan or replace run, shared across workers
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    // Remote traffic
    files_fetched: Arc<AtomicU64>,
    fetch_failures: Arc<AtomicU64>,
    bytes_fetched: Arc<AtomicU64>,

    // Content cache
    cache_hits: Arc<AtomicU64>,
    cache_misses: Arc<AtomicU64>,

    // Compiled pattern cache
    pattern_hits: Arc<AtomicU64>,
    pattern_misses: Arc<AtomicU64>,

    matches_found: Arc<AtomicU64>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            files_fetched: Arc::new(AtomicU64::new(0)),
            fetch_failures: Arc::new(AtomicU64::new(0)),
            bytes_fetched: Arc::new(AtomicU64::new(0)),
            cache_hits: Arc::new(AtomicU64::new(0)),
            cache_misses: Arc::new(AtomicU64::new(0)),
            pattern_hits: Arc::new(AtomicU64::new(0)),
            pattern_misses: Arc::new(AtomicU64::new(0)),
            matches_found: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a successful remote read
    pub fn record_fetch(&self, bytes: u64) {
        self.files_fetched.fetch_add(1, Ordering::Relaxed);
        let total = self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed) + bytes;
        debug!("Fetched {} bytes, total: {} bytes", bytes, total);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a content cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a compiled pattern lookup
    pub fn record_pattern_lookup(&self, hit: bool) {
        if hit {
            self.pattern_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pattern_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_matches(&self, count: usize) {
        self.matches_found.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            files_fetched: self.files_fetched.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            pattern_hits: self.pattern_hits.load(Ordering::Relaxed),
            pattern_misses: self.pattern_misses.load(Ordering::Relaxed),
            matches_found: self.matches_found.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Files fetched: {} ({} bytes)\n\
             Fetch failures: {}\n\
             Content cache hits/misses: {}/{}\n\
             Pattern cache hits/misses: {}/{}\n\
             Matches found: {}",
            stats.files_fetched,
            stats.bytes_fetched,
            stats.fetch_failures,
            stats.cache_hits,
            stats.cache_misses,
            stats.pattern_hits,
            stats.pattern_misses,
            stats.matches_found
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`ScanMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files_fetched: u64,
    pub fetch_failures: u64,
    pub bytes_fetched: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub pattern_hits: u64,
    pub pattern_misses: u64,
    pub matches_found: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_tracking() {
        let metrics = ScanMetrics::new();
        metrics.record_fetch(1000);
        metrics.record_fetch(500);
        metrics.record_fetch_failure();

        let stats = metrics.get_stats();
        assert_eq!(stats.files_fetched, 2);
        assert_eq!(stats.bytes_fetched, 1500);
        assert_eq!(stats.fetch_failures, 1);
    }

    #[test]
    fn test_cache_metrics() {
        let metrics = ScanMetrics::new();
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);
        metrics.record_cache_lookup(false);
        metrics.record_pattern_lookup(true);

        let stats = metrics.get_stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.pattern_hits, 1);
        assert_eq!(stats.pattern_misses, 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = ScanMetrics::new();
        let worker = metrics.clone();
        worker.record_matches(3);
        assert_eq!(metrics.get_stats().matches_found, 3);
    }
}
