//! The remote content-admin API.
//!
//! Content is addressed by full path (`/org/site/folder/page.html`); lifecycle
//! calls take site-relative logical paths (`/folder/page`). Every method maps
//! remote failures onto the per-file variants of [`ScoutError`] so callers can
//! record them per file and keep going.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ApiEndpoints;
use crate::errors::{ScoutError, ScoutResult};
use crate::results::FileDescriptor;

mod http;
mod memory;

pub use http::HttpAdminApi;
pub use memory::{ApiCall, FailOn, MemoryAdminApi};

/// One entry of a folder listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub ext: Option<String>,
    /// Seconds since the Unix epoch
    #[serde(default, rename = "lastModified")]
    pub last_modified: Option<u64>,
}

impl ListEntry {
    pub fn folder(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            ext: None,
            last_modified: None,
        }
    }

    pub fn file(name: &str, path: &str, last_modified: u64) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            ext: name.rsplit_once('.').map(|(_, ext)| ext.to_string()),
            last_modified: Some(last_modified),
        }
    }

    /// Folders carry neither an extension nor a modification time
    pub fn is_folder(&self) -> bool {
        self.ext.is_none() && self.last_modified.is_none() && self.name != ".DS_Store"
    }

    pub fn to_descriptor(&self) -> FileDescriptor {
        FileDescriptor {
            path: self.path.clone(),
            extension: self.ext.clone(),
            last_modified: self.last_modified,
            name: self.name.clone(),
        }
    }
}

/// A stored version of a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Path of the version content, relative to the admin origin
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl VersionRecord {
    /// Named versions have a url, a label and a timestamp; autosaves lack a label
    pub fn is_labeled(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            && self.label.as_deref().is_some_and(|l| !l.is_empty())
            && self.timestamp.is_some()
    }
}

/// Accepts a bare array, `{ "data": [...] }` or `{ "versions": [...] }`
pub fn parse_version_list(value: Value) -> ScoutResult<Vec<VersionRecord>> {
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => match (map.remove("data"), map.remove("versions")) {
            (Some(data @ Value::Array(_)), _) => data,
            (_, Some(versions @ Value::Array(_))) => versions,
            _ => {
                return Err(ScoutError::parse_failed(
                    "version list response has no version array",
                ))
            }
        },
        other => {
            return Err(ScoutError::parse_failed(format!(
                "unexpected version list response: {}",
                other
            )))
        }
    };
    Ok(serde_json::from_value(list)?)
}

/// Lifecycle transitions of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleOp {
    Preview,
    Publish,
    Unpublish,
}

impl LifecycleOp {
    /// Endpoint base for this transition
    pub fn endpoint(self, endpoints: &ApiEndpoints) -> &str {
        match self {
            LifecycleOp::Preview => &endpoints.preview,
            LifecycleOp::Publish | LifecycleOp::Unpublish => &endpoints.live,
        }
    }

    /// Publishing always targets the production branch; preview uses the working branch
    pub fn branch<'a>(self, working_branch: &'a str) -> &'a str {
        match self {
            LifecycleOp::Preview => working_branch,
            LifecycleOp::Publish | LifecycleOp::Unpublish => "main",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleOp::Preview => "preview",
            LifecycleOp::Publish => "publish",
            LifecycleOp::Unpublish => "unpublish",
        }
    }
}

impl std::fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a bulk lifecycle request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkResponse {
    /// The remote finished the work before answering
    Completed,
    /// The remote queued an asynchronous job
    JobStarted { name: String },
}

impl BulkResponse {
    /// Reads a bulk response body: a `job.name` means a job was queued
    pub fn from_body(body: &Value) -> Self {
        match body.pointer("/job/name").and_then(Value::as_str) {
            Some(name) => BulkResponse::JobStarted {
                name: name.to_string(),
            },
            None => BulkResponse::Completed,
        }
    }
}

/// Operations of the remote content-admin API
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Lists a folder by full path
    async fn list(&self, path: &str) -> ScoutResult<Vec<ListEntry>>;

    /// Reads the current source of a document
    async fn read_source(&self, path: &str) -> ScoutResult<String>;

    /// Replaces the source of a document
    async fn write_source(&self, path: &str, content: &str) -> ScoutResult<()>;

    /// Creates a labeled version of the document's current remote state. The
    /// remote may acknowledge without describing the version.
    async fn create_version(&self, path: &str, label: &str) -> ScoutResult<Option<VersionRecord>>;

    async fn list_versions(&self, path: &str) -> ScoutResult<Vec<VersionRecord>>;

    /// Reads version content by the version's own url
    async fn read_version(&self, url: &str) -> ScoutResult<String>;

    /// Single-item lifecycle call for a site-relative path
    async fn lifecycle(&self, op: LifecycleOp, path: &str) -> ScoutResult<()>;

    /// Batched lifecycle call for site-relative paths
    async fn bulk_lifecycle(&self, op: LifecycleOp, paths: &[String]) -> ScoutResult<BulkResponse>;

    async fn preview(&self, path: &str) -> ScoutResult<()> {
        self.lifecycle(LifecycleOp::Preview, path).await
    }

    async fn publish(&self, path: &str) -> ScoutResult<()> {
        self.lifecycle(LifecycleOp::Publish, path).await
    }

    async fn unpublish(&self, path: &str) -> ScoutResult<()> {
        self.lifecycle(LifecycleOp::Unpublish, path).await
    }

    async fn bulk_preview(&self, paths: &[String]) -> ScoutResult<BulkResponse> {
        self.bulk_lifecycle(LifecycleOp::Preview, paths).await
    }

    async fn bulk_publish(&self, paths: &[String]) -> ScoutResult<BulkResponse> {
        self.bulk_lifecycle(LifecycleOp::Publish, paths).await
    }
}
