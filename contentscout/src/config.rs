use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::discovery::DiscoveryOptions;
use crate::errors::{ScoutError, ScoutResult};

/// Tool-level configuration: which site to talk to, where to crawl and how hard.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.contentscout.yaml` in the current directory
/// 3. Global `$HOME/.config/contentscout/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// # Organization and site, as /org/site
/// org_site: "/acme/website"
///
/// # Folders to crawl (site-relative); empty means the whole site
/// search_paths:
///   - "/blog"
///
/// # Path fragments to skip
/// exclude_paths:
///   - "drafts"
///   - "/fragments/old"
///
/// # Only files modified after this point (RFC 3339 or a duration like "7d")
/// modified_since: "30d"
///
/// # Concurrent remote calls during scans, writes and reverts
/// worker_count: 10
///
/// discovery_timeout: "2m"
/// log_level: "info"
/// ```
///
/// The bearer token is never read from these files; see `CONTENTSCOUT_TOKEN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutConfig {
    /// Organization and site, written as `/org/site`
    #[serde(default)]
    pub org_site: Option<String>,

    /// Branch used for preview requests
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Remote admin endpoints
    #[serde(default)]
    pub api: ApiEndpoints,

    /// Site-relative folders to crawl; empty crawls the whole site
    #[serde(default)]
    pub search_paths: Vec<String>,

    /// Whether to descend into subfolders
    #[serde(default = "default_true")]
    pub recurse_subfolders: bool,

    /// Path fragments that exclude a file or folder when contained in its path
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// Only consider files modified after this point in time
    #[serde(default)]
    pub modified_since: Option<String>,

    /// Size of the worker pool used for content reads, writes and reverts
    #[serde(default = "default_worker_count")]
    pub worker_count: NonZeroUsize,

    /// Overall wall-clock limit for discovery (humantime syntax)
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout: String,

    /// Per-request limit for remote calls (humantime syntax)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Label given to the backup version created before each write
    #[serde(default = "default_backup_label")]
    pub backup_label: String,

    /// Results shown per page when listing a scan
    #[serde(default = "default_results_per_page")]
    pub results_per_page: usize,
}

/// Base URLs of the remote content-admin API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEndpoints {
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_list")]
    pub list: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_version_create")]
    pub version_create: String,
    #[serde(default = "default_version_list")]
    pub version_list: String,
    #[serde(default = "default_preview")]
    pub preview: String,
    #[serde(default = "default_live")]
    pub live: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            list: default_list(),
            source: default_source(),
            version_create: default_version_create(),
            version_list: default_version_list(),
            preview: default_preview(),
            live: default_live(),
        }
    }
}

fn default_origin() -> String {
    "https://admin.da.live".to_string()
}

fn default_list() -> String {
    "https://admin.da.live/list".to_string()
}

fn default_source() -> String {
    "https://admin.da.live/source".to_string()
}

fn default_version_create() -> String {
    "https://admin.da.live/versionsource".to_string()
}

fn default_version_list() -> String {
    "https://admin.da.live/versionlist".to_string()
}

fn default_preview() -> String {
    "https://admin.hlx.page/preview".to_string()
}

fn default_live() -> String {
    "https://admin.hlx.page/live".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}

fn default_worker_count() -> NonZeroUsize {
    NonZeroUsize::new(10).unwrap()
}

fn default_discovery_timeout() -> String {
    "120s".to_string()
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_backup_label() -> String {
    "Version created by contentscout".to_string()
}

fn default_results_per_page() -> usize {
    10
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            org_site: None,
            branch: default_branch(),
            api: ApiEndpoints::default(),
            search_paths: Vec::new(),
            recurse_subfolders: true,
            exclude_paths: Vec::new(),
            modified_since: None,
            worker_count: default_worker_count(),
            discovery_timeout: default_discovery_timeout(),
            request_timeout: default_request_timeout(),
            log_level: default_log_level(),
            backup_label: default_backup_label(),
            results_per_page: default_results_per_page(),
        }
    }
}

impl ScoutConfig {
    /// Loads configuration from the default locations
    pub fn load() -> ScoutResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus an optional explicit file
    pub fn load_from(config_path: Option<&Path>) -> ScoutResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("contentscout/config.yaml")),
            Some(PathBuf::from(".contentscout.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicit file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli_config: ScoutConfig) -> Self {
        if cli_config.org_site.is_some() {
            self.org_site = cli_config.org_site;
        }
        if cli_config.branch != default_branch() {
            self.branch = cli_config.branch;
        }
        if !cli_config.search_paths.is_empty() {
            self.search_paths = cli_config.search_paths;
        }
        if !cli_config.recurse_subfolders {
            self.recurse_subfolders = false;
        }
        if !cli_config.exclude_paths.is_empty() {
            self.exclude_paths = cli_config.exclude_paths;
        }
        if cli_config.modified_since.is_some() {
            self.modified_since = cli_config.modified_since;
        }
        if cli_config.worker_count != default_worker_count() {
            self.worker_count = cli_config.worker_count;
        }
        if cli_config.discovery_timeout != default_discovery_timeout() {
            self.discovery_timeout = cli_config.discovery_timeout;
        }
        if cli_config.log_level != default_log_level() {
            self.log_level = cli_config.log_level;
        }
        if cli_config.backup_label != default_backup_label() {
            self.backup_label = cli_config.backup_label;
        }
        self
    }

    /// The validated org/site identity
    pub fn org_site(&self) -> ScoutResult<OrgSite> {
        let raw = self.org_site.as_deref().ok_or_else(|| {
            ScoutError::config_error(
                "Organization and site must be configured as /org/site (e.g. /myorg/mysite)",
            )
        })?;
        OrgSite::parse(raw)
    }

    pub fn discovery_timeout(&self) -> ScoutResult<Duration> {
        parse_duration("discovery_timeout", &self.discovery_timeout)
    }

    pub fn request_timeout(&self) -> ScoutResult<Duration> {
        parse_duration("request_timeout", &self.request_timeout)
    }

    /// Resolves `modified_since` against `now`
    pub fn modified_since_at(&self, now: SystemTime) -> ScoutResult<Option<SystemTime>> {
        self.modified_since
            .as_deref()
            .map(|raw| parse_point_in_time(raw, now))
            .transpose()
    }

    /// Discovery options derived from this configuration
    pub fn discovery_options(&self) -> ScoutResult<DiscoveryOptions> {
        Ok(DiscoveryOptions {
            recurse_subfolders: self.recurse_subfolders,
            exclude_path_fragments: self.exclude_paths.clone(),
            modified_since: self.modified_since_at(SystemTime::now())?,
            only_extension: Some("html".to_string()),
            timeout: Some(self.discovery_timeout()?),
        })
    }
}

fn parse_duration(field: &str, raw: &str) -> ScoutResult<Duration> {
    humantime::parse_duration(raw)
        .map_err(|e| ScoutError::config_error(format!("Invalid {}: '{}' ({})", field, raw, e)))
}

/// Accepts an RFC 3339 timestamp, a bare `YYYY-MM-DD` date, or a duration
/// ("7d", "12h") measured back from `now`.
pub fn parse_point_in_time(raw: &str, now: SystemTime) -> ScoutResult<SystemTime> {
    let raw = raw.trim();
    let timestamp = if raw.len() == 10 {
        format!("{} 00:00:00", raw)
    } else {
        raw.to_string()
    };
    if let Ok(time) = humantime::parse_rfc3339_weak(&timestamp) {
        return Ok(time);
    }
    let ago = humantime::parse_duration(raw).map_err(|_| {
        ScoutError::config_error(format!(
            "Invalid modified_since '{}': expected a date or a duration like 7d",
            raw
        ))
    })?;
    now.checked_sub(ago)
        .ok_or_else(|| ScoutError::config_error(format!("modified_since '{}' is out of range", raw)))
}

/// Organization/site identity addressed by every remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgSite {
    pub org: String,
    pub site: String,
}

impl OrgSite {
    /// Parses `/org/site` (the leading slash is optional, extra segments are ignored)
    pub fn parse(raw: &str) -> ScoutResult<Self> {
        let mut parts = raw.trim().split('/').filter(|part| !part.is_empty());
        match (parts.next(), parts.next()) {
            (Some(org), Some(site)) => Ok(Self {
                org: org.to_string(),
                site: site.to_string(),
            }),
            _ => Err(ScoutError::config_error(format!(
                "Expected /org/site, got '{}'",
                raw
            ))),
        }
    }

    /// `/org/site`, the prefix of every full content path
    pub fn prefix(&self) -> String {
        format!("/{}/{}", self.org, self.site)
    }

    /// Joins a site-relative path onto the org/site prefix
    pub fn full_path(&self, relative: &str) -> String {
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() {
            self.prefix()
        } else {
            format!("{}/{}", self.prefix(), relative)
        }
    }

    /// Strips the org/site prefix from a full content path
    pub fn relative_path<'a>(&self, full: &'a str) -> &'a str {
        let prefix = self.prefix();
        match full.strip_prefix(prefix.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => full,
        }
    }

    /// Public preview host for this site on the given branch
    pub fn preview_origin(&self, branch: &str) -> String {
        format!("https://{}--{}--{}.aem.page", branch, self.site, self.org)
    }
}

impl std::fmt::Display for OrgSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.org, self.site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let config_content = r#"
            org_site: "/acme/website"
            search_paths: ["/blog", "/news"]
            exclude_paths: ["drafts"]
            recurse_subfolders: false
            worker_count: 4
            discovery_timeout: "30s"
            log_level: "debug"
            api:
              list: "http://localhost:9000/list"
        "#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let config = ScoutConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.org_site.as_deref(), Some("/acme/website"));
        assert_eq!(config.search_paths, vec!["/blog", "/news"]);
        assert_eq!(config.exclude_paths, vec!["drafts"]);
        assert!(!config.recurse_subfolders);
        assert_eq!(config.worker_count, NonZeroUsize::new(4).unwrap());
        assert_eq!(config.discovery_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.api.list, "http://localhost:9000/list");
        // Unset endpoints keep their defaults
        assert_eq!(config.api.source, "https://admin.da.live/source");
    }

    #[test]
    fn test_default_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "org_site: \"/a/b\"\n").unwrap();

        let config = ScoutConfig::load_from(Some(&config_path)).unwrap();
        assert!(config.recurse_subfolders);
        assert!(config.search_paths.is_empty());
        assert_eq!(config.worker_count, NonZeroUsize::new(10).unwrap());
        assert_eq!(config.branch, "main");
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.results_per_page, 10);
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "worker_count: \"many\"\nsearch_paths: 5\n").unwrap();

        assert!(ScoutConfig::load_from(Some(&config_path)).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ScoutConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_with_cli() {
        let file_config = ScoutConfig {
            org_site: Some("/acme/website".to_string()),
            search_paths: vec!["/blog".to_string()],
            exclude_paths: vec!["drafts".to_string()],
            ..ScoutConfig::default()
        };
        let cli_config = ScoutConfig {
            search_paths: vec!["/news".to_string()],
            recurse_subfolders: false,
            worker_count: NonZeroUsize::new(2).unwrap(),
            ..ScoutConfig::default()
        };

        let merged = file_config.merge_with_cli(cli_config);
        assert_eq!(merged.org_site.as_deref(), Some("/acme/website")); // file value
        assert_eq!(merged.search_paths, vec!["/news"]); // CLI value
        assert_eq!(merged.exclude_paths, vec!["drafts"]); // file value
        assert!(!merged.recurse_subfolders); // CLI value
        assert_eq!(merged.worker_count, NonZeroUsize::new(2).unwrap());
    }

    #[test]
    fn test_org_site_parsing() {
        let org_site = OrgSite::parse("/acme/website").unwrap();
        assert_eq!(org_site.org, "acme");
        assert_eq!(org_site.site, "website");
        assert_eq!(org_site.prefix(), "/acme/website");
        assert_eq!(OrgSite::parse("acme/website/extra").unwrap(), org_site);
        assert!(OrgSite::parse("/acme").is_err());
        assert!(OrgSite::parse("").is_err());

        assert_eq!(org_site.full_path("/blog"), "/acme/website/blog");
        assert_eq!(org_site.full_path(""), "/acme/website");
        assert_eq!(org_site.relative_path("/acme/website/blog/a.html"), "/blog/a.html");
        assert_eq!(org_site.relative_path("/acme/websites/a.html"), "/acme/websites/a.html");
        assert_eq!(
            org_site.preview_origin("main"),
            "https://main--website--acme.aem.page"
        );
    }

    #[test]
    fn test_modified_since_parsing() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let week_ago = parse_point_in_time("7d", now).unwrap();
        assert_eq!(now.duration_since(week_ago).unwrap(), Duration::from_secs(7 * 86_400));

        let date = parse_point_in_time("2023-11-14", now).unwrap();
        assert_eq!(
            date.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs(),
            1_699_920_000
        );

        assert!(parse_point_in_time("last tuesday", now).is_err());
    }
}
