use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

use super::html::{Document, Projection, Selector, TokenKind};
use super::options::{SearchConfig, TargetScope};
use crate::errors::ScoutResult;

pub const METADATA_SELECTOR: &str = r#".metadata, table[name="metadata"], #metadata"#;
pub const SECTION_METADATA_SELECTOR: &str =
    r#".section-metadata, [class*="section"], [data-aue-type="section"]"#;
pub const BLOCKS_SELECTOR: &str =
    r#".block, [class*="block"], .cards, .hero, .columns, .accordion, .fragment"#;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s<>"']+"#).expect("url pattern is valid"));

static CSS_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)url\([^)]*\)").expect("css url pattern is valid"));

/// Attributes whose values are links or media references
const URL_ATTRIBUTES: &[&str] = &["href", "src", "srcset", "data-src", "action", "media"];

/// Token ranges a search is restricted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRanges {
    /// Token index ranges in document order, never overlapping
    pub include: Vec<Range<usize>>,
    /// Token index ranges removed from `include`
    pub exclude: Vec<Range<usize>>,
    /// Only text nodes take part (targeted scopes)
    pub text_only: bool,
}

impl ScopeRanges {
    fn contains(&self, token: usize) -> bool {
        self.include.iter().any(|r| r.contains(&token))
            && !self.exclude.iter().any(|r| r.contains(&token))
    }
}

impl TargetScope {
    /// Resolves the scope against a document. A custom selector that does not
    /// parse is a `ParseFailed`.
    pub fn resolve(&self, doc: &Document<'_>) -> ScoutResult<ScopeRanges> {
        let ranges = |elements: Vec<usize>| -> Vec<Range<usize>> {
            doc.outermost(&elements)
                .into_iter()
                .map(|el| doc.elements()[el].tokens())
                .collect()
        };
        let metadata = Selector::parse(METADATA_SELECTOR)?;

        let scope = match self {
            TargetScope::All => ScopeRanges {
                include: vec![0..doc.tokens().len()],
                exclude: Vec::new(),
                text_only: false,
            },
            TargetScope::PageMetadata => ScopeRanges {
                include: ranges(doc.select_first(&metadata).into_iter().collect()),
                exclude: Vec::new(),
                text_only: true,
            },
            TargetScope::SectionMetadata => ScopeRanges {
                include: ranges(doc.select(&Selector::parse(SECTION_METADATA_SELECTOR)?)),
                exclude: Vec::new(),
                text_only: true,
            },
            TargetScope::Blocks => ScopeRanges {
                include: ranges(doc.select(&Selector::parse(BLOCKS_SELECTOR)?)),
                exclude: Vec::new(),
                text_only: true,
            },
            TargetScope::MainContent => {
                let main = doc.select_first(&Selector::parse("main")?);
                let exclude = main
                    .and_then(|main| {
                        doc.select(&metadata)
                            .into_iter()
                            .find(|&el| doc.contains(main, el))
                    })
                    .map(|el| vec![doc.elements()[el].tokens()])
                    .unwrap_or_default();
                ScopeRanges {
                    include: main.map(|el| vec![doc.elements()[el].tokens()]).unwrap_or_default(),
                    exclude,
                    text_only: true,
                }
            }
            TargetScope::CustomSelector(selector) => ScopeRanges {
                include: ranges(doc.select(&Selector::parse(selector)?)),
                exclude: Vec::new(),
                text_only: true,
            },
        };
        Ok(scope)
    }
}

/// Builds the text a search runs against: one tag or text node per line,
/// `class`/`id` attributes dropped and, with `exclude_urls_from_matching`,
/// link targets, media sources, CSS `url()` references, bare URLs and whole
/// anchor elements left out. Targeted scopes see text nodes with character
/// references decoded, as the page displays them.
pub fn project(doc: &Document<'_>, scope: &ScopeRanges, config: &SearchConfig) -> Projection {
    let source = doc.source();
    let excluded_anchors: Vec<Range<usize>> = if config.exclude_urls_from_matching {
        doc.elements()
            .iter()
            .filter(|el| el.name == "a")
            .map(|el| el.tokens())
            .collect()
    } else {
        Vec::new()
    };

    let mut projection = Projection::default();
    for (index, token) in doc.tokens().iter().enumerate() {
        if !scope.contains(index) || excluded_anchors.iter().any(|r| r.contains(&index)) {
            continue;
        }
        match &token.kind {
            TokenKind::Text => {
                let range = trim_range(source, token.range.clone());
                let cuts = if config.exclude_urls_from_matching {
                    URL_RE
                        .find_iter(&source[range.clone()])
                        .map(|m| range.start + m.start()..range.start + m.end())
                        .collect()
                } else {
                    Vec::new()
                };
                let pieces = keep_between(range, cuts);
                if scope.text_only {
                    projection.push_decoded_line(source, &pieces);
                } else {
                    projection.push_line(source, &pieces, true);
                }
            }
            TokenKind::StartTag { attributes, .. } if !scope.text_only => {
                let mut cuts: Vec<Range<usize>> = attributes
                    .iter()
                    .filter(|attr| {
                        attr.name == "class"
                            || attr.name == "id"
                            || (config.exclude_urls_from_matching
                                && (URL_ATTRIBUTES.contains(&attr.name.as_str())
                                    || attr.name.starts_with("data-")))
                    })
                    .map(|attr| attr.span.clone())
                    .collect();
                if config.exclude_urls_from_matching {
                    let tag = &source[token.range.clone()];
                    for re in [&*CSS_URL_RE, &*URL_RE] {
                        cuts.extend(
                            re.find_iter(tag)
                                .map(|m| token.range.start + m.start()..token.range.start + m.end()),
                        );
                    }
                }
                projection.push_line(source, &keep_between(token.range.clone(), cuts), false);
            }
            TokenKind::EndTag { .. } if !scope.text_only => {
                projection.push_line(source, &[token.range.clone()], false);
            }
            _ => {}
        }
    }
    projection
}

fn trim_range(source: &str, range: Range<usize>) -> Range<usize> {
    let text = &source[range.clone()];
    let start = range.start + (text.len() - text.trim_start().len());
    let end = range.end - (text.len() - text.trim_end().len());
    start..end.max(start)
}

/// The parts of `range` not covered by any of `cuts`
fn keep_between(range: Range<usize>, mut cuts: Vec<Range<usize>>) -> Vec<Range<usize>> {
    cuts.sort_by_key(|cut| cut.start);
    let mut kept = Vec::new();
    let mut cursor = range.start;
    for cut in cuts {
        if cut.start > cursor {
            kept.push(cursor..cut.start.min(range.end));
        }
        cursor = cursor.max(cut.end);
    }
    if cursor < range.end {
        kept.push(cursor..range.end);
    }
    kept
}
