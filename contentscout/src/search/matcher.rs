use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::ops::Range;
use std::sync::Arc;
use tracing::{trace, warn};

use super::html::{Document, Projection, Selector};
use super::options::{SearchConfig, SearchType};
use super::scope;
use crate::errors::{ScoutError, ScoutResult};
use crate::metrics::ScanMetrics;
use crate::results::MatchRecord;

/// Bytes of surrounding text kept on each side of a match
const CONTEXT_RADIUS: usize = 75;
const HTML_BLOCK_CONTEXT_RADIUS: usize = 150;
/// Characters of element text shown in element discovery
const ELEMENT_CONTEXT_CHARS: usize = 100;

static PATTERN_CACHE: Lazy<DashMap<(String, bool), Arc<Regex>>> = Lazy::new(DashMap::new);

static OPEN_GAP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s*<").expect("gap pattern is valid"));
static AFTER_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+").expect("gap pattern is valid"));
static BEFORE_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+<").expect("gap pattern is valid"));

/// Patterns whose first match in this empty-page check means "no content"
const EMPTY_PAGE_SKELETONS: &[&str] = &[
    "<body><header></header><main><div></div></main><footer></footer></body>",
    "<body><header></header><main></main><footer></footer></body>",
    "<body><main><div></div></main></body>",
    "<body><main></main></body>",
    "<body></body>",
    "<html><body></body></html>",
];

/// Whether fetched content amounts to an empty page
pub fn is_page_empty(content: &str) -> bool {
    let normalized: String = content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    normalized.is_empty() || EMPTY_PAGE_SKELETONS.contains(&normalized.as_str())
}

/// Strips a byte-order mark and an anti-XSSI `)]}'` prefix, then checks the
/// text parses as JSON. Returns the normalized text.
pub fn normalize_json(content: &str) -> Option<&str> {
    let trimmed = content.trim_start();
    let trimmed = trimmed.strip_prefix('\u{feff}').unwrap_or(trimmed);
    let trimmed = match trimmed.strip_prefix(")]}'") {
        Some(rest) => rest.strip_prefix(',').unwrap_or(rest).trim_start(),
        None => trimmed,
    };
    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .map(|_| trimmed)
}

/// An occurrence located in a search space
#[derive(Debug, Clone)]
pub(crate) struct Located {
    pub range: Range<usize>,
    pub text: String,
    pub line_number: usize,
    pub sequence_on_line: usize,
    /// Replacement with capture groups expanded, when a template was given
    pub replacement: Option<String>,
}

/// The text a search runs against, and how its offsets map to the source
pub(crate) enum SearchSpace<'a> {
    /// The source itself (HTML-block mode, JSON, unparseable pages)
    Raw(&'a str),
    /// A projection of a parsed document
    Projected {
        projection: Projection,
        text_only: bool,
    },
}

impl SearchSpace<'_> {
    pub fn text(&self) -> &str {
        match self {
            SearchSpace::Raw(text) => text,
            SearchSpace::Projected { projection, .. } => projection.text(),
        }
    }

    /// Whether the text holds decoded text nodes, so inserted text needs escaping
    pub fn decodes_text(&self) -> bool {
        matches!(self, SearchSpace::Projected { text_only: true, .. })
    }

    /// Maps a range of the search text to a range of the source
    pub fn source_range(&self, range: Range<usize>) -> Option<Range<usize>> {
        match self {
            SearchSpace::Raw(_) => Some(range),
            SearchSpace::Projected {
                projection,
                text_only,
            } => projection.source_range(range, *text_only),
        }
    }
}

/// Finds matches in document content.
///
/// Detection and replacement both go through [`MatchEngine::search_space`]
/// and [`MatchEngine::locate`], so the same configuration always yields the
/// same ordered occurrences and therefore the same match ids.
#[derive(Debug, Clone, Default)]
pub struct MatchEngine {
    metrics: ScanMetrics,
}

impl MatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: ScanMetrics) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// Builds the search pattern, compiling it once per process
    pub fn pattern(&self, config: &SearchConfig) -> ScoutResult<Arc<Regex>> {
        let source = Self::pattern_source(config);
        let key = (source, config.case_sensitive);
        if let Some(entry) = PATTERN_CACHE.get(&key) {
            self.metrics.record_pattern_lookup(true);
            return Ok(entry.clone());
        }

        let regex = Arc::new(
            RegexBuilder::new(&key.0)
                .case_insensitive(!config.case_sensitive)
                .build()?,
        );
        self.metrics.record_pattern_lookup(false);
        PATTERN_CACHE.insert(key, regex.clone());
        Ok(regex)
    }

    fn pattern_source(config: &SearchConfig) -> String {
        let term = config.search_term.trim();
        if config.html_block_mode {
            return match config.search_type {
                SearchType::RegularExpression => term.to_string(),
                _ => flexible_html_pattern(term),
            };
        }
        match config.search_type {
            SearchType::Contains => regex::escape(term),
            SearchType::Exact => format!(r"\b{}\b", regex::escape(term)),
            SearchType::RegularExpression => term.to_string(),
        }
    }

    /// Prepares the text a configuration searches. Targeted scopes fail with
    /// `ParseFailed` when the document or selector cannot be read; the
    /// whole-document scope falls back to the raw content instead.
    pub(crate) fn search_space<'a>(
        &self,
        content: &'a str,
        config: &SearchConfig,
    ) -> ScoutResult<SearchSpace<'a>> {
        if config.html_block_mode {
            return Ok(SearchSpace::Raw(content));
        }
        let doc = match Document::parse(content) {
            Ok(doc) => doc,
            Err(e) if !config.target_scope.is_targeted() => {
                warn!("Searching raw content: {}", e);
                return Ok(SearchSpace::Raw(content));
            }
            Err(e) => return Err(e),
        };
        let ranges = config.target_scope.resolve(&doc)?;
        Ok(SearchSpace::Projected {
            projection: scope::project(&doc, &ranges, config),
            text_only: ranges.text_only,
        })
    }

    /// Every non-empty occurrence of `regex` in `text`, in order, with line
    /// numbers counted in `text` itself
    pub(crate) fn locate(text: &str, regex: &Regex, template: Option<&str>) -> Vec<Located> {
        let mut located = Vec::new();
        let mut line = 1;
        let mut line_scan = 0;
        let mut current_line = 0;
        let mut sequence = 0;

        for caps in regex.captures_iter(text) {
            let Some(m) = caps.get(0) else { continue };
            if m.is_empty() {
                continue;
            }
            line += text[line_scan..m.start()].matches('\n').count();
            line_scan = m.start();
            sequence = if line == current_line { sequence + 1 } else { 1 };
            current_line = line;

            let replacement = template.map(|template| {
                let mut expanded = String::new();
                caps.expand(template, &mut expanded);
                expanded
            });
            located.push(Located {
                range: m.range(),
                text: m.as_str().to_string(),
                line_number: line,
                sequence_on_line: sequence,
                replacement,
            });
        }
        located
    }

    /// Finds all matches for `config` in `content`.
    ///
    /// Unparseable content under a targeted scope yields no matches.
    pub fn find_matches(&self, content: &str, config: &SearchConfig) -> ScoutResult<Vec<MatchRecord>> {
        if config.is_element_discovery() {
            return Ok(self.find_elements(content, config));
        }
        if !config.has_term() {
            return Ok(Vec::new());
        }

        let regex = self.pattern(config)?;
        let space = match self.search_space(content, config) {
            Ok(space) => space,
            Err(ScoutError::ParseFailed(reason)) => {
                warn!("Skipping scoped search: {}", reason);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let radius = if config.html_block_mode {
            HTML_BLOCK_CONTEXT_RADIUS
        } else {
            CONTEXT_RADIUS
        };
        let matches = Self::records(space.text(), &regex, radius);
        self.metrics.record_matches(matches.len());
        Ok(matches)
    }

    /// Matches in raw JSON text; without a search term the file itself is the match
    pub fn find_json_matches(&self, json: &str, config: &SearchConfig) -> ScoutResult<Vec<MatchRecord>> {
        if !config.has_term() {
            return Ok(vec![MatchRecord::synthetic("JSON file", "Detected JSON content")]);
        }
        let plain = SearchConfig {
            html_block_mode: false,
            ..config.clone()
        };
        let regex = self.pattern(&plain)?;
        let matches = Self::records(json, &regex, CONTEXT_RADIUS);
        self.metrics.record_matches(matches.len());
        Ok(matches)
    }

    fn records(text: &str, regex: &Regex, radius: usize) -> Vec<MatchRecord> {
        Self::locate(text, regex, None)
            .into_iter()
            .enumerate()
            .map(|(id, found)| {
                trace!(
                    "Match {} at line {} (#{}): {:?}",
                    id,
                    found.line_number,
                    found.sequence_on_line,
                    found.text
                );
                MatchRecord {
                    id,
                    context_snippet: context_window(text, found.range.clone(), radius).to_string(),
                    byte_offset: found.range.start,
                    matched_text: found.text,
                    line_number: found.line_number,
                    sequence_on_line: found.sequence_on_line,
                    selected: true,
                }
            })
            .collect()
    }

    /// Element-only discovery: every element matching the custom selector
    fn find_elements(&self, content: &str, config: &SearchConfig) -> Vec<MatchRecord> {
        let selector_text = config.target_scope.label().trim();
        let found = Document::parse(content).and_then(|doc| {
            let selector = Selector::parse(selector_text)?;
            Ok(doc
                .select(&selector)
                .into_iter()
                .map(|el| (doc.element_range(el).start, doc.text_content(el)))
                .collect::<Vec<_>>())
        });
        let elements = match found {
            Ok(elements) => elements,
            Err(e) => {
                warn!("Element discovery skipped: {}", e);
                return Vec::new();
            }
        };

        let matches: Vec<MatchRecord> = elements
            .into_iter()
            .enumerate()
            .map(|(id, (offset, text))| {
                let text = text.trim();
                let context = match text.char_indices().nth(ELEMENT_CONTEXT_CHARS) {
                    Some((cut, _)) => format!("{}...", &text[..cut]),
                    None => text.to_string(),
                };
                MatchRecord {
                    id,
                    matched_text: format!("Element {}: {}", id + 1, selector_text),
                    byte_offset: offset,
                    line_number: id + 1,
                    sequence_on_line: 1,
                    context_snippet: context,
                    selected: true,
                }
            })
            .collect();
        self.metrics.record_matches(matches.len());
        matches
    }
}

/// Escapes an HTML fragment so that wrapping `<p>` tags are optional and
/// whitespace around tags is flexible
fn flexible_html_pattern(term: &str) -> String {
    let escaped = regex::escape(term)
        .replace("</p>", "(?:</p>)?")
        .replace("<p>", "(?:<p>)?");
    let escaped = OPEN_GAP_RE.replace_all(&escaped, regex::NoExpand(r">\s*<"));
    let escaped = AFTER_TAG_RE.replace_all(&escaped, regex::NoExpand(r">\s*"));
    BEFORE_TAG_RE
        .replace_all(&escaped, regex::NoExpand(r"\s*<"))
        .into_owned()
}

/// Up to `radius` bytes either side of `range`, widened to char boundaries
fn context_window(text: &str, range: Range<usize>, radius: usize) -> &str {
    let mut start = range.start.saturating_sub(radius);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (range.end + radius).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::options::TargetScope;

    fn search(content: &str, config: &SearchConfig) -> Vec<MatchRecord> {
        MatchEngine::new().find_matches(content, config).unwrap()
    }

    #[test]
    fn test_matches_per_tag_line() {
        let matches = search(
            "<p>Hello World</p><p>Hello Moon</p>",
            &SearchConfig::contains("hello"),
        );
        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].line_number, matches[0].sequence_on_line), (2, 1));
        assert_eq!((matches[1].line_number, matches[1].sequence_on_line), (5, 1));
        assert_eq!(matches[0].matched_text, "Hello");
        assert!(matches.iter().all(|m| m.selected));
        assert_eq!(matches[1].id, 1);
    }

    #[test]
    fn test_sequence_on_line() {
        let matches = search("<p>cat cat cat</p>", &SearchConfig::contains("cat"));
        let sequences: Vec<_> = matches.iter().map(|m| m.sequence_on_line).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(matches.iter().all(|m| m.line_number == 2));
    }

    #[test]
    fn test_search_types_and_case() {
        let content = "<p>Cat concatenate CAT</p>";
        assert_eq!(search(content, &SearchConfig::contains("cat")).len(), 3);

        let exact = SearchConfig {
            search_type: SearchType::Exact,
            ..SearchConfig::contains("cat")
        };
        assert_eq!(search(content, &exact).len(), 2);

        let sensitive = SearchConfig {
            case_sensitive: true,
            ..SearchConfig::contains("cat")
        };
        assert_eq!(search(content, &sensitive).len(), 1);

        let regex = SearchConfig {
            search_type: SearchType::RegularExpression,
            ..SearchConfig::contains(r"c\w+e")
        };
        assert_eq!(search(content, &regex)[0].matched_text, "concatenate");
    }

    #[test]
    fn test_class_and_id_never_match() {
        let content = r#"<div class="hero" id="hero">Welcome</div>"#;
        assert!(search(content, &SearchConfig::contains("hero")).is_empty());
    }

    #[test]
    fn test_exclude_urls() {
        let content = r#"<p>See <a href="https://acme.com/docs">acme docs</a> or https://acme.com</p><img src="/acme.png" alt="acme logo">"#;
        assert_eq!(search(content, &SearchConfig::contains("acme")).len(), 5);

        let excluded = SearchConfig {
            exclude_urls_from_matching: true,
            ..SearchConfig::contains("acme")
        };
        let matches = search(content, &excluded);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].context_snippet.contains("alt="));
    }

    #[test]
    fn test_targeted_scope() {
        let content = r#"<main><div><p>Hello body</p></div><div><div class="metadata"><div><div>Title</div><div>Hello meta</div></div></div></div></main>"#;
        let metadata = SearchConfig {
            target_scope: TargetScope::PageMetadata,
            ..SearchConfig::contains("hello")
        };
        let matches = search(content, &metadata);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].context_snippet, "Title\nHello meta");

        let main = SearchConfig {
            target_scope: TargetScope::MainContent,
            ..SearchConfig::contains("hello")
        };
        assert_eq!(search(content, &main).len(), 1);
    }

    #[test]
    fn test_element_discovery() {
        let content = r#"<div class="hero"><h1>Big title</h1></div><p>x</p><div class="hero">Second</div>"#;
        let config = SearchConfig {
            target_scope: TargetScope::CustomSelector(".hero".to_string()),
            ..SearchConfig::default()
        };
        let matches = search(content, &config);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].matched_text, "Element 1: .hero");
        assert_eq!(matches[0].context_snippet, "Big title");
        assert_eq!(matches[1].line_number, 2);

        let invalid = SearchConfig {
            target_scope: TargetScope::CustomSelector("div:hover".to_string()),
            ..SearchConfig::default()
        };
        assert!(search(content, &invalid).is_empty());
    }

    #[test]
    fn test_html_block_mode_is_flexible() {
        let config = SearchConfig {
            html_block_mode: true,
            ..SearchConfig::contains("<h2>Title</h2>\n<p>Intro</p>")
        };
        let with_wrapper = "<div><h2>Title</h2>   <p>Intro</p></div>";
        let without_wrapper = "<div><h2>Title</h2>Intro</div>";
        assert_eq!(search(with_wrapper, &config).len(), 1);
        assert_eq!(search(without_wrapper, &config).len(), 1);
        assert_eq!(
            search(with_wrapper, &config)[0].matched_text,
            "<h2>Title</h2>   <p>Intro</p>"
        );
    }

    #[test]
    fn test_unparseable_content() {
        let broken = "<p>Hello</p><div class=\"x\"";
        // Whole-document search falls back to the raw text
        assert_eq!(search(broken, &SearchConfig::contains("hello")).len(), 1);

        let scoped = SearchConfig {
            target_scope: TargetScope::Blocks,
            ..SearchConfig::contains("hello")
        };
        assert!(search(broken, &scoped).is_empty());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let content = "<p>a b a</p><p>b a</p>";
        let config = SearchConfig::contains("a");
        assert_eq!(search(content, &config), search(content, &config));
    }

    #[test]
    fn test_pattern_caching() {
        let unique = format!(
            "pattern_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        let engine = MatchEngine::new();
        let config = SearchConfig::contains(unique.as_str());

        engine.pattern(&config).unwrap();
        engine.pattern(&config).unwrap();
        let stats = engine.metrics().get_stats();
        assert_eq!(stats.pattern_misses, 1);
        assert_eq!(stats.pattern_hits, 1);
    }

    #[test]
    fn test_is_page_empty() {
        assert!(is_page_empty(""));
        assert!(is_page_empty("<body></body>"));
        assert!(is_page_empty("<BODY>\n  <main>\n  </main>\n</BODY>"));
        assert!(is_page_empty(
            "<body><header></header><main><div></div></main><footer></footer></body>"
        ));
        assert!(!is_page_empty("<body><main><div><p>Hi</p></div></main></body>"));
    }

    #[test]
    fn test_json_matching() {
        assert_eq!(normalize_json("\u{feff}{\"a\": 1}"), Some("{\"a\": 1}"));
        assert_eq!(normalize_json(")]}',\n[1, 2]"), Some("[1, 2]"));
        assert_eq!(normalize_json("<html></html>"), None);

        let engine = MatchEngine::new();
        let all = engine.find_json_matches("{}", &SearchConfig::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].matched_text, "JSON file");

        let json = "{\n  \"title\": \"Acme\",\n  \"owner\": \"acme\"\n}";
        let matches = engine
            .find_json_matches(json, &SearchConfig::contains("acme"))
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[1].line_number, 3);
    }

    #[test]
    fn test_context_window_respects_char_boundaries() {
        let text = "ééééé target ééééé";
        let start = text.find("target").unwrap();
        let window = context_window(text, start..start + 6, 8);
        assert!(window.contains("target"));
        assert!(window.starts_with('é'));
    }

    #[test]
    fn test_context_window_keeps_long_matches_whole() {
        let block = format!("<div>{}</div>", "x".repeat(200));
        let text = format!("before {} after", block);
        let start = text.find("<div>").unwrap();
        let window = context_window(&text, start..start + block.len(), 10);
        assert!(window.contains(&block));
        assert!(window.ends_with("after"));
    }

    #[test]
    fn test_entities_match_in_targeted_scopes() {
        let content = "<main><div><p>Terms &amp; Conditions</p></div></main>";
        let config = SearchConfig {
            target_scope: TargetScope::MainContent,
            ..SearchConfig::contains("Terms & Conditions")
        };
        let matches = search(content, &config);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_text, "Terms & Conditions");

        let nbsp = SearchConfig {
            target_scope: TargetScope::CustomSelector("p".to_string()),
            ..SearchConfig::contains("a\u{a0}b")
        };
        assert_eq!(search("<p>a&nbsp;b</p>", &nbsp).len(), 1);
    }
}
