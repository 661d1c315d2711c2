//! Bulk find and replace over a remote content tree.
//!
//! A scan crawls the site ([`discovery`]), reads each page ([`store`]) and
//! records every match ([`search`]). The caller deselects what it wants to
//! keep; [`replace`] then backs up each file ([`versions`]) and rewrites only
//! the selected matches. [`bulk`] previews, publishes or unpublishes the same
//! selection.
//!
//! ```rust,ignore
//! let ctx = ScoutContext::from_config(&config, &token)?;
//! let search = SearchConfig::contains("Acme Corp").with_replacement(Replacement::Text("Acme".into()));
//! let mut session = scan(&ctx, search, &config.search_paths, &config.discovery_options()?, None).await?;
//! session.toggle(0, 1)?;
//! let report = session.replace(&ctx).await?;
//! println!("{}", report.summary());
//! ```

pub mod api;
pub mod bulk;
pub mod config;
pub mod context;
pub mod discovery;
pub mod errors;
pub mod export;
pub mod filters;
pub mod metrics;
pub mod pool;
pub mod replace;
pub mod results;
pub mod search;
pub mod session;
pub mod store;
pub mod versions;

pub use api::{AdminApi, HttpAdminApi, MemoryAdminApi};
pub use bulk::{transition, BulkOperation, BulkReport};
pub use config::{OrgSite, ScoutConfig};
pub use context::ScoutContext;
pub use discovery::{Discovery, DiscoveryOptions};
pub use errors::{ScoutError, ScoutResult};
pub use replace::{replace_selected, ReplaceEngine, ReplaceReport};
pub use results::{FileDescriptor, FileResult, MatchRecord, ScanSummary, SelectionState};
pub use search::{scan, MatchEngine, Replacement, SearchConfig, SearchType, TargetScope};
pub use session::ScanSession;
pub use versions::{revert_all, RevertReport, VersionManager};
