use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{AdminApi, BulkResponse, LifecycleOp, ListEntry, VersionRecord};
use crate::errors::{ScoutError, ScoutResult};

/// A recorded call against [`MemoryAdminApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    List(String),
    Read(String),
    Write(String),
    CreateVersion { path: String, label: String },
    ListVersions(String),
    ReadVersion(String),
    Lifecycle(LifecycleOp, String),
    BulkLifecycle(LifecycleOp, Vec<String>),
}

/// Which kind of call an injected failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOn {
    List,
    Read,
    Write,
    CreateVersion,
    ListVersions,
    ReadVersion,
    Lifecycle,
}

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    last_modified: u64,
}

#[derive(Debug, Clone)]
struct StoredVersion {
    record: VersionRecord,
    content: String,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, StoredFile>,
    versions: HashMap<String, Vec<StoredVersion>>,
    failures: HashSet<(FailOn, String)>,
    calls: Vec<ApiCall>,
    bulk_job: Option<String>,
    clock: i64,
}

/// An in-memory content store speaking the [`AdminApi`] contract.
///
/// Folders are implied by file paths. Failures can be injected per call kind
/// and path; every call is recorded for inspection.
#[derive(Debug, Default)]
pub struct MemoryAdminApi {
    state: Mutex<State>,
}

impl MemoryAdminApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep using it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a file at a full path
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.with_file_at(path, content, 1_700_000_000)
    }

    pub fn with_file_at(self, path: &str, content: &str, last_modified: u64) -> Self {
        self.state().files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                last_modified,
            },
        );
        self
    }

    /// Answers bulk lifecycle calls with a queued job of this name
    pub fn with_bulk_job(self, name: &str) -> Self {
        self.state().bulk_job = Some(name.to_string());
        self
    }

    /// Adds a version of `path` holding `content`
    pub fn add_version(&self, path: &str, label: Option<&str>, timestamp: i64, content: &str) {
        let mut state = self.state();
        let versions = state.versions.entry(path.to_string()).or_default();
        let url = format!("/versionsource{}/{}", path, versions.len() + 1);
        versions.push(StoredVersion {
            record: VersionRecord {
                url: Some(url),
                label: label.map(str::to_string),
                timestamp: Some(timestamp),
            },
            content: content.to_string(),
        });
        state.clock = state.clock.max(timestamp);
    }

    /// Makes every `kind` call for `path` fail
    pub fn fail(&self, kind: FailOn, path: &str) {
        self.state().failures.insert((kind, path.to_string()));
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.state().files.get(path).map(|f| f.content.clone())
    }

    pub fn versions(&self, path: &str) -> Vec<VersionRecord> {
        self.state()
            .versions
            .get(path)
            .map(|v| v.iter().map(|s| s.record.clone()).collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count_calls(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    fn enter(&self, call: ApiCall, kind: FailOn, path: &str) -> Result<MutexGuard<'_, State>, String> {
        let mut state = self.state();
        state.calls.push(call);
        if state.failures.contains(&(kind, path.to_string())) {
            return Err("HTTP 500".to_string());
        }
        Ok(state)
    }
}

#[async_trait]
impl AdminApi for MemoryAdminApi {
    async fn list(&self, path: &str) -> ScoutResult<Vec<ListEntry>> {
        let state = self
            .enter(ApiCall::List(path.to_string()), FailOn::List, path)
            .map_err(|reason| ScoutError::fetch_failed(path, reason))?;

        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut folders = BTreeSet::new();
        let mut entries = Vec::new();
        for (file_path, file) in state.files.range(prefix.clone()..) {
            let Some(rest) = file_path.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((folder, _)) => {
                    folders.insert(folder.to_string());
                }
                None => entries.push(ListEntry::file(rest, file_path, file.last_modified)),
            }
        }
        entries.extend(
            folders
                .into_iter()
                .map(|name| ListEntry::folder(&name, &format!("{}{}", prefix, name))),
        );
        Ok(entries)
    }

    async fn read_source(&self, path: &str) -> ScoutResult<String> {
        let state = self
            .enter(ApiCall::Read(path.to_string()), FailOn::Read, path)
            .map_err(|reason| ScoutError::fetch_failed(path, reason))?;
        state
            .files
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| ScoutError::fetch_failed(path, "HTTP 404"))
    }

    async fn write_source(&self, path: &str, content: &str) -> ScoutResult<()> {
        let mut state = self
            .enter(ApiCall::Write(path.to_string()), FailOn::Write, path)
            .map_err(|reason| ScoutError::write_failed(path, reason))?;
        state.clock += 1;
        let last_modified = state.clock.max(0) as u64;
        state.files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                last_modified,
            },
        );
        Ok(())
    }

    async fn create_version(&self, path: &str, label: &str) -> ScoutResult<Option<VersionRecord>> {
        let call = ApiCall::CreateVersion {
            path: path.to_string(),
            label: label.to_string(),
        };
        let mut state = self
            .enter(call, FailOn::CreateVersion, path)
            .map_err(|_| ScoutError::backup_failed(path))?;
        let content = state
            .files
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| ScoutError::backup_failed(path))?;

        state.clock += 1;
        let timestamp = state.clock;
        let versions = state.versions.entry(path.to_string()).or_default();
        let record = VersionRecord {
            url: Some(format!("/versionsource{}/{}", path, versions.len() + 1)),
            label: Some(label.to_string()),
            timestamp: Some(timestamp),
        };
        versions.push(StoredVersion {
            record: record.clone(),
            content,
        });
        Ok(Some(record))
    }

    async fn list_versions(&self, path: &str) -> ScoutResult<Vec<VersionRecord>> {
        let state = self
            .enter(ApiCall::ListVersions(path.to_string()), FailOn::ListVersions, path)
            .map_err(|reason| ScoutError::fetch_failed(path, reason))?;
        Ok(state
            .versions
            .get(path)
            .map(|v| v.iter().map(|s| s.record.clone()).collect())
            .unwrap_or_default())
    }

    async fn read_version(&self, url: &str) -> ScoutResult<String> {
        let state = self
            .enter(ApiCall::ReadVersion(url.to_string()), FailOn::ReadVersion, url)
            .map_err(|reason| ScoutError::fetch_failed(url, reason))?;
        state
            .versions
            .values()
            .flatten()
            .find(|v| v.record.url.as_deref() == Some(url))
            .map(|v| v.content.clone())
            .ok_or_else(|| ScoutError::fetch_failed(url, "HTTP 404"))
    }

    async fn lifecycle(&self, op: LifecycleOp, path: &str) -> ScoutResult<()> {
        self.enter(ApiCall::Lifecycle(op, path.to_string()), FailOn::Lifecycle, path)
            .map(|_| ())
            .map_err(|reason| ScoutError::lifecycle_failed(path, format!("{} failed: {}", op, reason)))
    }

    async fn bulk_lifecycle(&self, op: LifecycleOp, paths: &[String]) -> ScoutResult<BulkResponse> {
        let state = self
            .enter(ApiCall::BulkLifecycle(op, paths.to_vec()), FailOn::Lifecycle, "/*")
            .map_err(|reason| ScoutError::lifecycle_failed("/*", format!("bulk {} failed: {}", op, reason)))?;
        Ok(match &state.bulk_job {
            Some(name) => BulkResponse::JobStarted { name: name.clone() },
            None => BulkResponse::Completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> MemoryAdminApi {
        MemoryAdminApi::new()
            .with_file("/acme/site/index.html", "<p>Home</p>")
            .with_file("/acme/site/blog/one.html", "<p>One</p>")
            .with_file("/acme/site/blog/2024/two.html", "<p>Two</p>")
            .with_file("/acme/site/data.json", "{}")
    }

    #[tokio::test]
    async fn test_listing_implies_folders() {
        let api = api();
        let root = api.list("/acme/site").await.unwrap();
        let names: Vec<_> = root.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["data.json", "index.html", "blog"]);
        assert!(root[2].is_folder());
        assert_eq!(root[2].path, "/acme/site/blog");

        let blog = api.list("/acme/site/blog").await.unwrap();
        assert_eq!(blog.len(), 2);
        assert_eq!(blog[0].ext.as_deref(), Some("html"));
    }

    #[tokio::test]
    async fn test_versions_snapshot_content() {
        let api = api();
        let record = api
            .create_version("/acme/site/index.html", "Before")
            .await
            .unwrap()
            .unwrap();
        api.write_source("/acme/site/index.html", "<p>Changed</p>").await.unwrap();

        let url = record.url.unwrap();
        assert_eq!(api.read_version(&url).await.unwrap(), "<p>Home</p>");
        assert_eq!(api.content("/acme/site/index.html").unwrap(), "<p>Changed</p>");
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let api = api();
        api.fail(FailOn::Read, "/acme/site/index.html");
        api.fail(FailOn::CreateVersion, "/acme/site/index.html");

        assert!(matches!(
            api.read_source("/acme/site/index.html").await,
            Err(ScoutError::FetchFailed { .. })
        ));
        assert!(matches!(
            api.create_version("/acme/site/index.html", "x").await,
            Err(ScoutError::BackupFailed { .. })
        ));
        assert!(api.read_source("/acme/site/blog/one.html").await.is_ok());
        assert_eq!(api.count_calls(|c| matches!(c, ApiCall::Read(_))), 2);
    }
}
