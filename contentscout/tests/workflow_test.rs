use anyhow::Result;
use contentscout::api::{ApiCall, BulkResponse, FailOn, LifecycleOp};
use contentscout::{
    replace_selected, revert_all, scan, transition, BulkOperation, BulkReport, DiscoveryOptions,
    MemoryAdminApi, OrgSite, Replacement, ScanSession, ScoutContext, ScoutError, SearchConfig,
};
use std::sync::Arc;
use tempfile::tempdir;

const LABEL: &str = "Version created by contentscout";

fn context(api: &Arc<MemoryAdminApi>) -> Result<ScoutContext> {
    Ok(ScoutContext::new(api.clone(), OrgSite::parse("/acme/site")?).with_worker_count(4))
}

fn html_options() -> DiscoveryOptions {
    DiscoveryOptions {
        recurse_subfolders: true,
        only_extension: Some("html".to_string()),
        ..DiscoveryOptions::default()
    }
}

fn rename(from: &str, to: &str) -> SearchConfig {
    SearchConfig::contains(from).with_replacement(Replacement::Text(to.to_string()))
}

#[tokio::test]
async fn test_scan_replace_revert() -> Result<()> {
    let api = Arc::new(
        MemoryAdminApi::new()
            .with_file("/acme/site/index.html", "<h1>Acme Corp</h1><p>Welcome to Acme Corp</p>")
            .with_file("/acme/site/blog/post.html", "<p>Acme Corp news</p>")
            .with_file("/acme/site/about.html", "<p>Nothing here</p>"),
    );
    let ctx = context(&api)?;

    let mut session = scan(&ctx, rename("Acme Corp", "Acme"), &[], &html_options(), None).await?;
    assert_eq!(session.results.len(), 2);
    assert_eq!(session.summary.matches_found, 3);

    let report = session.replace(&ctx).await?;
    assert_eq!(report.summary(), "Updated 2/2 files; created 2 backups");
    assert!(report.backup_warning().is_none());
    assert_eq!(
        api.content("/acme/site/index.html").as_deref(),
        Some("<h1>Acme</h1><p>Welcome to Acme</p>")
    );
    assert_eq!(
        api.content("/acme/site/blog/post.html").as_deref(),
        Some("<p>Acme news</p>")
    );
    assert_eq!(api.versions("/acme/site/index.html")[0].label.as_deref(), Some(LABEL));

    let reverted = revert_all(&ctx, &session.selected_paths()).await;
    assert_eq!(reverted.succeeded(), 2);
    assert_eq!(
        api.content("/acme/site/index.html").as_deref(),
        Some("<h1>Acme Corp</h1><p>Welcome to Acme Corp</p>")
    );
    // The state the revert replaced was itself backed up
    let labels: Vec<_> = api
        .versions("/acme/site/blog/post.html")
        .into_iter()
        .filter_map(|v| v.label)
        .collect();
    assert_eq!(labels, vec![LABEL.to_string(), format!("Revert({})", LABEL)]);
    Ok(())
}

#[tokio::test]
async fn test_deselected_match_is_kept() -> Result<()> {
    let api = Arc::new(MemoryAdminApi::new().with_file(
        "/acme/site/page.html",
        "<p>Old one</p><p>Old two</p><p>Old three</p>",
    ));
    let ctx = context(&api)?;

    let mut session = scan(&ctx, rename("Old", "New"), &[], &html_options(), None).await?;
    assert_eq!(session.results[0].matches.len(), 3);
    assert!(!session.toggle(0, 1)?);

    let report = session.replace(&ctx).await?;
    assert_eq!(report.updated(), 1);
    assert_eq!(
        api.content("/acme/site/page.html").as_deref(),
        Some("<p>New one</p><p>Old two</p><p>New three</p>")
    );
    assert_eq!(
        session.results[0].updated_content.as_deref(),
        Some("<p>New one</p><p>Old two</p><p>New three</p>")
    );
    Ok(())
}

#[tokio::test]
async fn test_backup_failure_skips_write() -> Result<()> {
    let api = Arc::new(
        MemoryAdminApi::new()
            .with_file("/acme/site/a.html", "<p>Old</p>")
            .with_file("/acme/site/b.html", "<p>Old</p>"),
    );
    api.fail(FailOn::CreateVersion, "/acme/site/b.html");
    let ctx = context(&api)?;

    let mut session = scan(&ctx, rename("Old", "New"), &[], &html_options(), None).await?;
    let report = session.replace(&ctx).await?;

    assert_eq!(report.summary(), "Updated 1/2 files; created 1 backups");
    assert_eq!(report.skipped_for_backup(), vec!["/acme/site/b.html"]);
    assert!(report.backup_warning().is_some());
    assert_eq!(api.content("/acme/site/a.html").as_deref(), Some("<p>New</p>"));
    assert_eq!(api.content("/acme/site/b.html").as_deref(), Some("<p>Old</p>"));
    assert_eq!(
        api.count_calls(|c| matches!(c, ApiCall::Write(p) if p == "/acme/site/b.html")),
        0
    );
    assert!(session.results[1].updated_content.is_none());
    Ok(())
}

#[tokio::test]
async fn test_replace_rejects_changed_search() -> Result<()> {
    let api = Arc::new(MemoryAdminApi::new().with_file("/acme/site/a.html", "<p>Old</p>"));
    let ctx = context(&api)?;

    let mut session = scan(&ctx, rename("Old", "New"), &[], &html_options(), None).await?;
    let changed = SearchConfig {
        case_sensitive: true,
        ..rename("Old", "New")
    };
    let result = replace_selected(&ctx, &changed, &mut session.results).await;

    assert!(matches!(result, Err(ScoutError::ConfigMismatch { .. })));
    assert_eq!(api.count_calls(|c| matches!(c, ApiCall::Write(_))), 0);
    assert_eq!(api.content("/acme/site/a.html").as_deref(), Some("<p>Old</p>"));
    Ok(())
}

#[tokio::test]
async fn test_saved_session_replaces_after_reload() -> Result<()> {
    let api = Arc::new(MemoryAdminApi::new().with_file("/acme/site/a.html", "<p>Hello Hello</p>"));
    let ctx = context(&api)?;
    let dir = tempdir()?;
    let path = dir.path().join("scan.json");

    let session = scan(&ctx, SearchConfig::contains("Hello"), &[], &html_options(), None).await?;
    session.save(&path)?;

    let mut reloaded = ScanSession::load(&path)?;
    reloaded.config.replacement = Some(Replacement::Text("Bye".to_string()));
    reloaded.set_match_selected(0, 0, false)?;
    reloaded.replace(&ctx).await?;

    assert_eq!(api.content("/acme/site/a.html").as_deref(), Some("<p>Hello Bye</p>"));
    Ok(())
}

#[tokio::test]
async fn test_blank_pages_and_broken_pages() -> Result<()> {
    let api = Arc::new(
        MemoryAdminApi::new()
            .with_file("/acme/site/empty.html", "<body><main><div></div></main></body>")
            .with_file("/acme/site/broken.html", "<body></body>")
            .with_file("/acme/site/full.html", "<body><main><p>Text</p></main></body>"),
    );
    api.fail(FailOn::Read, "/acme/site/broken.html");
    let ctx = context(&api)?;
    let config = SearchConfig {
        find_blank_pages_only: true,
        ..SearchConfig::default()
    };

    let session = scan(&ctx, config, &[], &html_options(), None).await?;
    let blank: Vec<_> = session.results.iter().map(|r| r.file.path.as_str()).collect();
    assert_eq!(blank, vec!["/acme/site/empty.html"]);
    assert_eq!(session.summary.files_scanned, 3);
    assert_eq!(session.summary.fetch_failures, 1);
    Ok(())
}

#[tokio::test]
async fn test_unpublish_reports_each_file() -> Result<()> {
    let api = Arc::new(MemoryAdminApi::new());
    api.fail(FailOn::Lifecycle, "/b");
    let ctx = context(&api)?;
    let paths: Vec<String> = ["/acme/site/a.html", "/acme/site/b.html", "/acme/site/c.html"]
        .iter()
        .map(|p| p.to_string())
        .collect();

    let report = transition(&ctx, BulkOperation::Unpublish, &paths).await?;
    assert!(!report.is_success());
    assert_eq!(report.summary(), "Unpublished 2/3 files; failed: /b");
    assert_eq!(
        api.count_calls(|c| matches!(c, ApiCall::Lifecycle(LifecycleOp::Unpublish, _))),
        3
    );
    Ok(())
}

#[tokio::test]
async fn test_preview_single_and_batched() -> Result<()> {
    let api = Arc::new(MemoryAdminApi::new().with_bulk_job("job-7"));
    let ctx = context(&api)?;

    let single = transition(&ctx, BulkOperation::Preview, &["/acme/site/a.html".to_string()]).await?;
    assert!(single.is_success());
    assert_eq!(
        api.calls(),
        vec![ApiCall::Lifecycle(LifecycleOp::Preview, "/a".to_string())]
    );

    let paths = vec!["/acme/site/a.html".to_string(), "/acme/site/nav.json".to_string()];
    let batch = transition(&ctx, BulkOperation::Preview, &paths).await?;
    match batch {
        BulkReport::Batch { count, result, .. } => {
            assert_eq!(count, 2);
            assert_eq!(result?, BulkResponse::JobStarted { name: "job-7".to_string() });
        }
        other => panic!("expected a batched call, got {:?}", other),
    }
    assert!(api.calls().contains(&ApiCall::BulkLifecycle(
        LifecycleOp::Preview,
        vec!["/a".to_string(), "/nav.json".to_string()]
    )));
    Ok(())
}

#[tokio::test]
async fn test_copy_urls_makes_no_calls() -> Result<()> {
    let api = Arc::new(MemoryAdminApi::new());
    let ctx = context(&api)?;

    let report = transition(&ctx, BulkOperation::CopyUrls, &["/acme/site/blog/post.html".to_string()]).await?;
    match report {
        BulkReport::Urls(urls) => assert_eq!(urls, vec!["https://main--site--acme.aem.page/blog/post"]),
        other => panic!("expected urls, got {:?}", other),
    }
    assert!(api.calls().is_empty());
    Ok(())
}
