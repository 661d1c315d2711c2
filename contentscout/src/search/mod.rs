//! Detection: search configuration, document scoping and the match engine.
//!
//! A page is searched through a projection of its source with one tag or text
//! node per line, so line numbers mean the same thing for every page and
//! every pass. Targeted scopes narrow the projection to parts of the page;
//! HTML-block mode skips it and searches the raw source.
//!
//! ```rust,ignore
//! let config = SearchConfig::contains("Hello");
//! let matches = MatchEngine::new().find_matches("<p>Hello World</p>", &config)?;
//! assert_eq!(matches[0].line_number, 2);
//! ```

pub mod engine;
pub mod html;
pub mod matcher;
pub mod options;
pub mod scope;

pub use engine::scan;
pub use html::format_html;
pub use matcher::{is_page_empty, normalize_json, MatchEngine};
pub use options::{Replacement, SearchConfig, SearchType, TargetScope};
