use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{parse_version_list, AdminApi, BulkResponse, LifecycleOp, ListEntry, VersionRecord};
use crate::config::{ApiEndpoints, OrgSite};
use crate::errors::{ScoutError, ScoutResult};

/// [`AdminApi`] over HTTPS with a bearer token
#[derive(Debug, Clone)]
pub struct HttpAdminApi {
    client: Client,
    endpoints: ApiEndpoints,
    org_site: OrgSite,
    branch: String,
    token: String,
}

impl HttpAdminApi {
    pub fn new(
        endpoints: ApiEndpoints,
        org_site: OrgSite,
        branch: impl Into<String>,
        token: impl Into<String>,
        request_timeout: Duration,
    ) -> ScoutResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("contentscout/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoints,
            org_site,
            branch: branch.into(),
            token: token.into(),
        })
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        debug!("{} {}", method, url);
        self.client.request(method, url).bearer_auth(&self.token)
    }

    fn lifecycle_url(&self, op: LifecycleOp, path: &str) -> String {
        format!(
            "{}/{}/{}/{}{}",
            op.endpoint(&self.endpoints).trim_end_matches('/'),
            self.org_site.org,
            self.org_site.site,
            op.branch(&self.branch),
            path
        )
    }
}

/// Joins a base URL and a content path without doubling the separator
fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turns a non-2xx response into its status line plus any body text
async fn check(response: Response) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        Err(format!("HTTP {}", status.as_u16()))
    } else {
        Err(format!("HTTP {}: {}", status.as_u16(), body))
    }
}

/// Sends a request and checks its status, keeping transport errors as text
async fn send(request: RequestBuilder) -> Result<Response, String> {
    match request.send().await {
        Ok(response) => check(response).await,
        Err(e) => Err(e.to_string()),
    }
}

#[async_trait]
impl AdminApi for HttpAdminApi {
    async fn list(&self, path: &str) -> ScoutResult<Vec<ListEntry>> {
        let response = send(self.request(Method::GET, join(&self.endpoints.list, path)))
            .await
            .map_err(|reason| ScoutError::fetch_failed(path, reason))?;
        response
            .json::<Vec<ListEntry>>()
            .await
            .map_err(|e| ScoutError::fetch_failed(path, e.to_string()))
    }

    async fn read_source(&self, path: &str) -> ScoutResult<String> {
        let response = send(self.request(Method::GET, join(&self.endpoints.source, path)))
            .await
            .map_err(|reason| ScoutError::fetch_failed(path, reason))?;
        response
            .text()
            .await
            .map_err(|e| ScoutError::fetch_failed(path, e.to_string()))
    }

    async fn write_source(&self, path: &str, content: &str) -> ScoutResult<()> {
        let part = Part::text(content.to_string()).mime_str("text/html")?;
        let form = Form::new().part("data", part);
        send(
            self.request(Method::POST, join(&self.endpoints.source, path))
                .multipart(form),
        )
        .await
        .map(|_| ())
        .map_err(|reason| ScoutError::write_failed(path, reason))
    }

    async fn create_version(&self, path: &str, label: &str) -> ScoutResult<Option<VersionRecord>> {
        let response = send(
            self.request(Method::POST, join(&self.endpoints.version_create, path))
                .json(&json!({ "label": label })),
        )
        .await
        .map_err(|reason| {
            debug!("Version create failed for {}: {}", path, reason);
            ScoutError::backup_failed(path)
        })?;

        // Acknowledgements come with or without a JSON description
        let body = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str::<VersionRecord>(&body).ok())
    }

    async fn list_versions(&self, path: &str) -> ScoutResult<Vec<VersionRecord>> {
        let response = send(self.request(Method::GET, join(&self.endpoints.version_list, path)))
            .await
            .map_err(|reason| ScoutError::fetch_failed(path, reason))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ScoutError::fetch_failed(path, e.to_string()))?;
        parse_version_list(body)
    }

    async fn read_version(&self, url: &str) -> ScoutResult<String> {
        let full = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            join(&self.endpoints.origin, url)
        };
        let response = send(self.request(Method::GET, full))
            .await
            .map_err(|reason| ScoutError::fetch_failed(url, reason))?;
        response
            .text()
            .await
            .map_err(|e| ScoutError::fetch_failed(url, e.to_string()))
    }

    async fn lifecycle(&self, op: LifecycleOp, path: &str) -> ScoutResult<()> {
        let method = match op {
            LifecycleOp::Unpublish => Method::DELETE,
            LifecycleOp::Preview | LifecycleOp::Publish => Method::POST,
        };
        send(self.request(method, self.lifecycle_url(op, path)))
            .await
            .map(|_| ())
            .map_err(|reason| ScoutError::lifecycle_failed(path, format!("{} failed: {}", op, reason)))
    }

    async fn bulk_lifecycle(&self, op: LifecycleOp, paths: &[String]) -> ScoutResult<BulkResponse> {
        if op == LifecycleOp::Unpublish {
            return Err(ScoutError::config_error(
                "unpublish has no bulk endpoint; unpublish paths one by one",
            ));
        }
        let payload = json!({
            "forceUpdate": true,
            "paths": paths,
            "delete": false,
        });
        let response = send(
            self.request(Method::POST, self.lifecycle_url(op, "/*"))
                .json(&payload),
        )
        .await
        .map_err(|reason| ScoutError::lifecycle_failed("/*", format!("bulk {} failed: {}", op, reason)))?;
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(BulkResponse::from_body(&body))
    }
}
