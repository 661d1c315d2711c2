use std::sync::Arc;
use tracing::{debug, info, warn};

use super::matcher::{is_page_empty, normalize_json, MatchEngine};
use super::options::SearchConfig;
use crate::api::AdminApi;
use crate::context::ScoutContext;
use crate::discovery::{Discovery, DiscoveryOptions, ProgressFn};
use crate::errors::ScoutResult;
use crate::pool::run_bounded;
use crate::results::{FileDescriptor, FileResult, MatchRecord};
use crate::session::ScanSession;
use crate::store::{ContentStore, FetchOutcome};

/// What scanning one file produced
enum FileScan {
    Hit(FileResult),
    Miss,
    FetchFailed,
}

/// Discovers files under `roots`, fetches them through the worker pool and
/// collects every file that matches `config` into a new session.
///
/// Fetch failures are counted in the summary and never reported as matches;
/// in blank-page mode in particular, a page that could not be read is not blank.
pub async fn scan(
    ctx: &ScoutContext,
    config: SearchConfig,
    roots: &[String],
    options: &DiscoveryOptions,
    progress: Option<ProgressFn>,
) -> ScoutResult<ScanSession> {
    config.validate()?;
    info!(
        "Starting scan for {:?} in {} ({})",
        config.search_term,
        ctx.org_site,
        config.target_scope.label()
    );

    let mut options = options.clone();
    if config.find_json_files_only {
        options.only_extension = None;
    }
    let mut discovery = Discovery::new(ctx.api.as_ref(), &ctx.org_site).with_cancel(ctx.cancel.clone());
    if let Some(progress) = progress {
        discovery = discovery.with_progress(progress);
    }
    let discovered = discovery.enumerate(roots, &options).await?;
    debug!("Scanning {} files", discovered.files.len());

    let api = ctx.api.clone();
    let store = ctx.store.clone();
    let engine = MatchEngine::with_metrics(ctx.metrics.clone());
    let shared = Arc::new(config.clone());
    let scans = run_bounded(
        discovered.files.clone(),
        ctx.worker_count,
        &ctx.cancel,
        move |file: FileDescriptor| {
            let (api, store, engine, config) = (api.clone(), store.clone(), engine.clone(), shared.clone());
            async move { scan_file(api.as_ref(), &store, &engine, &config, file).await }
        },
    )
    .await;

    let mut session = ScanSession::new(config);
    session.summary.files_scanned = discovered.files.len();
    session.summary.cancelled = discovered.cancelled || ctx.cancel.is_cancelled();
    for scanned in scans.into_iter().flatten() {
        match scanned {
            FileScan::Hit(result) => {
                session.summary.record(&result);
                session.results.push(result);
            }
            FileScan::Miss => {}
            FileScan::FetchFailed => session.summary.fetch_failures += 1,
        }
    }

    if session.summary.fetch_failures > 0 {
        warn!(
            "{} of {} files could not be fetched",
            session.summary.fetch_failures, session.summary.files_scanned
        );
    }
    info!(
        "Scan finished: {} matches in {} of {} files",
        session.summary.matches_found, session.summary.files_affected, session.summary.files_scanned
    );
    ctx.metrics.log_stats();
    Ok(session)
}

async fn scan_file(
    api: &dyn AdminApi,
    store: &ContentStore,
    engine: &MatchEngine,
    config: &SearchConfig,
    file: FileDescriptor,
) -> FileScan {
    // Blank-page checks always read fresh content
    let use_cache = !config.find_blank_pages_only;
    let content = match store.read(api, &file.path, use_cache).await {
        FetchOutcome::Fetched(content) => content,
        FetchOutcome::Failed(_) => return FileScan::FetchFailed,
    };

    let fingerprint = config.fingerprint();
    let hit = |matches: Vec<MatchRecord>, content: String| FileResult {
        file: file.clone(),
        matches,
        original_content: content,
        updated_content: None,
        expanded: false,
        is_blank_page: false,
        is_json_file: false,
        element_count: 0,
        config_fingerprint: fingerprint,
    };

    if config.find_blank_pages_only {
        if !is_page_empty(&content) {
            return FileScan::Miss;
        }
        debug!("{} is blank", file.path);
        return FileScan::Hit(FileResult {
            is_blank_page: true,
            ..hit(
                vec![MatchRecord::synthetic("Blank page", "Page has no content")],
                content,
            )
        });
    }

    if config.find_json_files_only {
        let Some(json) = normalize_json(&content) else {
            return FileScan::Miss;
        };
        return match engine.find_json_matches(json, config) {
            Ok(matches) if !matches.is_empty() => FileScan::Hit(FileResult {
                is_json_file: true,
                ..hit(matches, content)
            }),
            Ok(_) => FileScan::Miss,
            Err(e) => {
                warn!("{}: {}", file.path, e);
                FileScan::Miss
            }
        };
    }

    match engine.find_matches(&content, config) {
        Ok(matches) if !matches.is_empty() => {
            let element_count = if config.is_element_discovery() {
                matches.len()
            } else {
                0
            };
            debug!("{}: {} matches", file.path, matches.len());
            FileScan::Hit(FileResult {
                element_count,
                ..hit(matches, content)
            })
        }
        Ok(_) => FileScan::Miss,
        Err(e) => {
            warn!("{}: {}", file.path, e);
            FileScan::Miss
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FailOn, MemoryAdminApi};
    use crate::config::OrgSite;
    use crate::search::TargetScope;

    fn context(api: MemoryAdminApi) -> ScoutContext {
        ScoutContext::new(Arc::new(api), OrgSite::parse("/acme/site").unwrap())
    }

    fn html_options() -> DiscoveryOptions {
        DiscoveryOptions {
            recurse_subfolders: true,
            only_extension: Some("html".to_string()),
            ..DiscoveryOptions::default()
        }
    }

    #[tokio::test]
    async fn test_scan_collects_matching_files() {
        let ctx = context(
            MemoryAdminApi::new()
                .with_file("/acme/site/a.html", "<p>Hello World</p><p>Hello Moon</p>")
                .with_file("/acme/site/blog/b.html", "<p>Goodbye</p>")
                .with_file("/acme/site/blog/c.html", "<p>hello again</p>"),
        );
        let session = scan(&ctx, SearchConfig::contains("Hello"), &[], &html_options(), None)
            .await
            .unwrap();

        let paths: Vec<_> = session.results.iter().map(|r| r.file.path.as_str()).collect();
        assert_eq!(paths, vec!["/acme/site/a.html", "/acme/site/blog/c.html"]);
        assert_eq!(session.summary.files_scanned, 3);
        assert_eq!(session.summary.matches_found, 3);
        assert_eq!(
            session.results[0].config_fingerprint,
            SearchConfig::contains("Hello").fingerprint()
        );
    }

    #[tokio::test]
    async fn test_blank_pages_exclude_fetch_failures() {
        let api = MemoryAdminApi::new()
            .with_file("/acme/site/empty.html", "<body></body>")
            .with_file("/acme/site/broken.html", "")
            .with_file("/acme/site/full.html", "<body><p>Text</p></body>");
        api.fail(FailOn::Read, "/acme/site/broken.html");
        let ctx = context(api);
        let config = SearchConfig {
            find_blank_pages_only: true,
            ..SearchConfig::default()
        };

        let session = scan(&ctx, config, &[], &html_options(), None).await.unwrap();
        assert_eq!(session.results.len(), 1);
        assert_eq!(session.results[0].file.path, "/acme/site/empty.html");
        assert!(session.results[0].is_blank_page);
        assert_eq!(session.summary.fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_json_mode_lists_any_extension() {
        let ctx = context(
            MemoryAdminApi::new()
                .with_file("/acme/site/nav.json", ")]}',\n{\"items\": [\"Home\"]}")
                .with_file("/acme/site/page.html", "<p>Home</p>")
                .with_file("/acme/site/notes.txt", "not json"),
        );
        let config = SearchConfig {
            find_json_files_only: true,
            ..SearchConfig::default()
        };
        let session = scan(&ctx, config, &[], &html_options(), None).await.unwrap();

        assert_eq!(session.results.len(), 1);
        assert!(session.results[0].is_json_file);
        assert_eq!(session.results[0].matches[0].matched_text, "JSON file");
    }

    #[tokio::test]
    async fn test_element_discovery_counts_elements() {
        let ctx = context(MemoryAdminApi::new().with_file(
            "/acme/site/a.html",
            r#"<div class="cards"><p>One</p></div><div class="cards"><p>Two</p></div>"#,
        ));
        let config = SearchConfig {
            target_scope: TargetScope::CustomSelector(".cards".to_string()),
            ..SearchConfig::default()
        };
        let session = scan(&ctx, config, &[], &html_options(), None).await.unwrap();
        assert_eq!(session.results[0].element_count, 2);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_discovery() {
        let api = Arc::new(MemoryAdminApi::new());
        let ctx = ScoutContext::new(api.clone(), OrgSite::parse("/acme/site").unwrap());
        assert!(scan(&ctx, SearchConfig::default(), &[], &html_options(), None)
            .await
            .is_err());
        assert!(api.calls().is_empty());
    }
}
