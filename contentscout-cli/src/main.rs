use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use contentscout::{
    bulk::{preview_url, BulkOperation, BulkReport},
    config::OrgSite,
    discovery::{DiscoveryProgress, ProgressFn},
    export::export_selected,
    replace::{generate_file_diff, ReplaceReport},
    results::{FileResult, SelectionState},
    scan, transition, revert_all, MatchEngine, ReplaceEngine, Replacement, RevertReport,
    ScanSession, ScoutConfig, ScoutContext, SearchConfig, SearchType, TargetScope, VersionManager,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    num::NonZeroUsize,
    path::PathBuf,
    sync::Arc,
    time::{Duration, UNIX_EPOCH},
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod diff_utils;

use diff_utils::{print_changed_lines, print_unified_diff};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Organization and site, as /org/site
    #[arg(short = 's', long, global = true)]
    org_site: Option<String>,

    /// Branch used for preview requests and preview URLs
    #[arg(long, global = true)]
    branch: Option<String>,

    /// Bearer token for the admin API
    #[arg(long, global = true, env = "CONTENTSCOUT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Concurrent remote calls
    #[arg(short = 'j', long, global = true)]
    workers: Option<NonZeroUsize>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    All,
    PageMetadata,
    SectionMetadata,
    Blocks,
    MainContent,
}

#[derive(Args)]
struct ScanArgs {
    /// Text or pattern to search for
    term: Option<String>,

    /// Treat the term as a regular expression
    #[arg(short = 'r', long, conflicts_with = "exact")]
    regex: bool,

    /// Match whole words only
    #[arg(short = 'w', long)]
    exact: bool,

    #[arg(short = 'c', long)]
    case_sensitive: bool,

    /// Match the term against raw page source, markup included
    #[arg(long)]
    html_block: bool,

    /// Restrict matching to part of each page
    #[arg(long, value_enum, default_value = "all", conflicts_with = "selector")]
    scope: ScopeArg,

    /// Restrict matching to elements matching a CSS selector
    #[arg(long)]
    selector: Option<String>,

    /// Ignore URLs: link and media attributes (href, src, srcset, data-src, action, media), data-* attributes, CSS url() values, bare URLs and whole <a> elements
    #[arg(long)]
    exclude_urls: bool,

    /// Find pages with no content instead of searching
    #[arg(long, conflicts_with = "json_files")]
    blank_pages: bool,

    /// Find JSON files instead of pages
    #[arg(long)]
    json_files: bool,

    /// Replacement to record in the saved session
    #[arg(long = "with", conflicts_with = "remove")]
    replace_with: Option<String>,

    /// Record removal of matched text as the replacement
    #[arg(long)]
    remove: bool,

    /// Site-relative folders to crawl (repeatable)
    #[arg(short = 'p', long = "path")]
    paths: Vec<String>,

    /// Do not descend into subfolders
    #[arg(long)]
    no_recurse: bool,

    /// Skip paths containing this fragment (repeatable)
    #[arg(short = 'x', long)]
    exclude: Vec<String>,

    /// Only files modified after this date or duration ago (e.g. 2024-01-31, 7d)
    #[arg(long)]
    since: Option<String>,

    /// Save the scan session to this file
    #[arg(short = 'o', long)]
    save: Option<PathBuf>,

    /// Result page to print
    #[arg(long, default_value = "1")]
    page: usize,

    /// Only print results whose path, match or context contains this text
    #[arg(long)]
    filter: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BulkArg {
    Preview,
    Publish,
    Unpublish,
    CopyUrls,
}

impl From<BulkArg> for BulkOperation {
    fn from(arg: BulkArg) -> Self {
        match arg {
            BulkArg::Preview => BulkOperation::Preview,
            BulkArg::Publish => BulkOperation::Publish,
            BulkArg::Unpublish => BulkOperation::Unpublish,
            BulkArg::CopyUrls => BulkOperation::CopyUrls,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the site and record every match
    Scan(Box<ScanArgs>),

    /// Rewrite the selected matches of a saved scan
    Replace {
        /// Saved scan session
        #[arg(long)]
        session: PathBuf,

        /// Replacement text (overrides the one saved with the session)
        #[arg(long = "with", conflicts_with = "remove")]
        replace_with: Option<String>,

        /// Remove the matched text
        #[arg(long)]
        remove: bool,

        /// Deselect a match before replacing, as FILE:ID where FILE is a
        /// result number or path (repeatable)
        #[arg(short = 'd', long)]
        deselect: Vec<String>,

        /// Show the changes without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Restore files to their newest labeled version
    Revert {
        /// Site-relative or full paths
        paths: Vec<String>,

        /// Revert the selected files of a saved session instead
        #[arg(long, conflicts_with = "paths")]
        session: Option<PathBuf>,
    },

    /// Preview, publish, unpublish or copy the URLs of selected files
    Bulk {
        #[arg(value_enum)]
        operation: BulkArg,

        /// Site-relative or full paths
        paths: Vec<String>,

        /// Use the selected files of a saved session instead
        #[arg(long, conflicts_with = "paths")]
        session: Option<PathBuf>,
    },

    /// Write the selected results of a session to a local directory
    Export {
        #[arg(long)]
        session: PathBuf,

        #[arg(long, default_value = "export")]
        out: PathBuf,
    },

    /// List the labeled versions of a document
    ListVersions {
        /// Site-relative or full path
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.common)?;
    init_tracing(cli.common.log_level.as_deref().unwrap_or(&config.log_level));
    debug!("Loaded configuration for {:?}", config.org_site);

    match cli.command {
        Commands::Scan(args) => run_scan(&cli.common, &config, *args).await,
        Commands::Replace {
            session,
            replace_with,
            remove,
            deselect,
            dry_run,
        } => {
            let replacement = replacement_arg(replace_with, remove);
            run_replace(&cli.common, &config, session, replacement, &deselect, dry_run).await
        }
        Commands::Revert { paths, session } => {
            let ctx = context(&cli.common, &config)?;
            let paths = target_paths(&ctx.org_site, paths, session)?;
            let report = revert_all(&ctx, &paths).await;
            print_revert_report(&report);
            Ok(())
        }
        Commands::Bulk {
            operation,
            paths,
            session,
        } => {
            let operation = BulkOperation::from(operation);
            let org_site = config.org_site()?;
            let paths = target_paths(&org_site, paths, session)?;
            let report = if operation == BulkOperation::CopyUrls {
                // Built locally; no token needed
                BulkReport::Urls(
                    paths
                        .iter()
                        .map(|p| preview_url(&org_site, &config.branch, p))
                        .collect(),
                )
            } else {
                let ctx = context(&cli.common, &config)?;
                transition(&ctx, operation, &paths).await?
            };
            print_bulk_report(&report);
            Ok(())
        }
        Commands::Export { session, out } => {
            let org_site = config.org_site()?;
            let session = ScanSession::load(&session)?;
            let written = export_selected(&org_site, &session.results, &out)?;
            println!("Exported {} files to {}", written.len(), out.display().to_string().blue());
            Ok(())
        }
        Commands::ListVersions { path } => {
            let ctx = context(&cli.common, &config)?;
            let path = full_path(&ctx.org_site, &path);
            let versions = VersionManager::new(ctx.api.clone())
                .labeled_versions(&path)
                .await?;
            if versions.is_empty() {
                println!("No labeled versions of {}", path);
            }
            for version in versions {
                println!(
                    "{}  {}",
                    version.timestamp.map(format_timestamp).unwrap_or_default().green(),
                    version.label.unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

fn load_config(common: &CommonArgs) -> Result<ScoutConfig> {
    let file_config = ScoutConfig::load_from(common.config.as_deref())?;
    let mut cli_config = ScoutConfig {
        org_site: common.org_site.clone(),
        ..ScoutConfig::default()
    };
    if let Some(branch) = &common.branch {
        cli_config.branch = branch.clone();
    }
    if let Some(workers) = common.workers {
        cli_config.worker_count = workers;
    }
    Ok(file_config.merge_with_cli(cli_config))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Context for remote calls; cancelled on Ctrl-C
fn context(common: &CommonArgs, config: &ScoutConfig) -> Result<ScoutContext> {
    let token = common
        .token
        .as_deref()
        .context("An API token is required (--token or CONTENTSCOUT_TOKEN)")?;
    let ctx = ScoutContext::from_config(config, token)?;
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling; finishing requests in flight".yellow());
            cancel.cancel();
        }
    });
    Ok(ctx)
}

/// Accepts full content paths as they are and folds site-relative ones onto the prefix
fn full_path(org_site: &OrgSite, path: &str) -> String {
    if path.starts_with(&format!("{}/", org_site.prefix())) {
        path.to_string()
    } else {
        org_site.full_path(path)
    }
}

fn target_paths(org_site: &OrgSite, paths: Vec<String>, session: Option<PathBuf>) -> Result<Vec<String>> {
    let paths = match session {
        Some(session) => ScanSession::load(&session)?.selected_paths(),
        None => paths.iter().map(|p| full_path(org_site, p)).collect(),
    };
    if paths.is_empty() {
        bail!("No files given; pass paths or a session with selected results");
    }
    Ok(paths)
}

fn replacement_arg(text: Option<String>, remove: bool) -> Option<Replacement> {
    if remove {
        Some(Replacement::Remove)
    } else {
        text.map(Replacement::Text)
    }
}

async fn run_scan(common: &CommonArgs, config: &ScoutConfig, args: ScanArgs) -> Result<()> {
    let mut config = config.clone();
    if !args.paths.is_empty() {
        config.search_paths = args.paths.clone();
    }
    if args.no_recurse {
        config.recurse_subfolders = false;
    }
    config.exclude_paths.extend(args.exclude.iter().cloned());
    if args.since.is_some() {
        config.modified_since = args.since.clone();
    }

    let search = SearchConfig {
        search_term: args.term.clone().unwrap_or_default(),
        replacement: replacement_arg(args.replace_with.clone(), args.remove),
        search_type: if args.regex {
            SearchType::RegularExpression
        } else if args.exact {
            SearchType::Exact
        } else {
            SearchType::Contains
        },
        case_sensitive: args.case_sensitive,
        html_block_mode: args.html_block,
        target_scope: match (&args.selector, args.scope) {
            (Some(selector), _) => TargetScope::CustomSelector(selector.clone()),
            (None, ScopeArg::All) => TargetScope::All,
            (None, ScopeArg::PageMetadata) => TargetScope::PageMetadata,
            (None, ScopeArg::SectionMetadata) => TargetScope::SectionMetadata,
            (None, ScopeArg::Blocks) => TargetScope::Blocks,
            (None, ScopeArg::MainContent) => TargetScope::MainContent,
        },
        exclude_urls_from_matching: args.exclude_urls,
        find_blank_pages_only: args.blank_pages,
        find_json_files_only: args.json_files,
    };
    search.validate()?;

    let ctx = context(common, &config)?;
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    bar.enable_steady_tick(Duration::from_millis(120));
    let progress: ProgressFn = {
        let bar = bar.clone();
        Arc::new(move |p: DiscoveryProgress| {
            bar.set_message(format!("Listed {} folders, {} files found", p.folders_listed, p.files_found));
        })
    };

    let session = scan(
        &ctx,
        search,
        &config.search_paths,
        &config.discovery_options()?,
        Some(progress),
    )
    .await;
    bar.finish_and_clear();

    let mut session = session?.with_per_page(config.results_per_page);
    if let Some(filter) = &args.filter {
        session.set_filter(filter);
    }
    print_scan_results(&session, args.page);

    if let Some(path) = &args.save {
        session.save(path)?;
        println!("Session saved to {}", path.display().to_string().blue());
    }
    Ok(())
}

async fn run_replace(
    common: &CommonArgs,
    config: &ScoutConfig,
    session_path: PathBuf,
    replacement: Option<Replacement>,
    deselect: &[String],
    dry_run: bool,
) -> Result<()> {
    let mut session = ScanSession::load(&session_path)?;
    if let Some(replacement) = replacement {
        session.config.replacement = Some(replacement);
    }
    for reference in deselect {
        let (file, id) = parse_match_ref(&session, reference)?;
        session.set_match_selected(file, id, false)?;
    }
    session.config.validate_for_replace()?;

    if dry_run {
        println!("Dry run - no changes will be made");
        let engine = ReplaceEngine::new(MatchEngine::new());
        for result in session.results.iter().filter(|r| r.is_selected()) {
            match engine.apply(result, &session.config) {
                Ok(outcome) => {
                    let diff = generate_file_diff(&result.file.path, &result.original_content, &outcome.content);
                    print_changed_lines(&diff);
                }
                Err(e) => println!("{}: {}", result.file.path.blue(), e.to_string().red()),
            }
        }
        return Ok(());
    }

    let ctx = context(common, config)?;
    let report = session.replace(&ctx).await?;
    for result in session.results.iter().filter(|r| r.updated_content.is_some()) {
        print_unified_diff(&result.file.path, &result.original_content, result.current_content());
    }
    print_replace_report(&report);
    session.save(&session_path)?;
    Ok(())
}

/// Resolves `FILE:ID`, where FILE is a 1-based result number or a path
fn parse_match_ref(session: &ScanSession, reference: &str) -> Result<(usize, usize)> {
    let (file, id) = reference
        .rsplit_once(':')
        .with_context(|| format!("Expected FILE:ID, got '{}'", reference))?;
    let id = id.parse().with_context(|| format!("Invalid match id in '{}'", reference))?;
    let index = match file.parse::<usize>() {
        Ok(number) if number >= 1 => number - 1,
        _ => session
            .results
            .iter()
            .position(|r| r.file.path == file || r.file.path.ends_with(file))
            .with_context(|| format!("No result for '{}'", file))?,
    };
    Ok((index, id))
}

fn print_scan_results(session: &ScanSession, page: usize) {
    let view = session.page(page);
    for (offset, result) in view.items.iter().enumerate() {
        let number = session
            .position(&result.file.path)
            .map(|i| i + 1)
            .unwrap_or(offset + 1);
        print_file_result(number, result);
    }

    let summary = &session.summary;
    println!(
        "\nFound {} matches in {} of {} files",
        summary.matches_found, summary.files_affected, summary.files_scanned
    );
    if view.total_pages > 1 {
        println!("Page {} of {} ({} results)", view.page, view.total_pages, view.total_results);
    }
    if summary.fetch_failures > 0 {
        println!(
            "{}",
            format!("{} files could not be fetched", summary.fetch_failures).yellow()
        );
    }
    if summary.cancelled {
        println!("{}", "Scan was cancelled; results are partial".yellow());
    }
}

fn print_file_result(number: usize, result: &FileResult) {
    let marker = match result.selection() {
        SelectionState::All => "[x]",
        SelectionState::Partial => "[-]",
        SelectionState::None => "[ ]",
    };
    let mut header = format!("\n{} {}. {}", marker, number, result.file.path.blue());
    if result.element_count > 0 {
        header.push_str(&format!(" ({} elements)", result.element_count));
    }
    println!("{}", header);
    for m in &result.matches {
        println!(
            "  #{} {}: {}",
            m.id,
            m.line_number.to_string().green(),
            m.context_snippet.replace(&m.matched_text, &m.matched_text.yellow().to_string())
        );
    }
}

fn print_replace_report(report: &ReplaceReport) {
    println!("\n{}", report.summary());
    for (path, error) in report.failures() {
        println!("  {} {}", path.blue(), error.to_string().red());
    }
    if let Some(warning) = report.backup_warning() {
        println!("{}", warning.yellow());
    }
}

fn print_revert_report(report: &RevertReport) {
    for (path, version) in report.successes() {
        println!(
            "Reverted {} to {}",
            path.blue(),
            version.label.as_deref().unwrap_or_default().green()
        );
    }
    for (path, error) in report.failures() {
        println!("{} {}", path.blue(), error.to_string().red());
    }
    println!("\nReverted {}/{} files", report.succeeded(), report.total());
}

fn print_bulk_report(report: &BulkReport) {
    if let BulkReport::Urls(urls) = report {
        for url in urls {
            println!("{}", url);
        }
    }
    let summary = report.summary();
    if report.is_success() {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.red());
    }
}

fn format_timestamp(millis: i64) -> String {
    let time = UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64);
    humantime::format_rfc3339_seconds(time).to_string()
}
