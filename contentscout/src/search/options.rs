use serde::{Deserialize, Serialize};

use crate::errors::{ScoutError, ScoutResult};

/// How the search term is turned into a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchType {
    /// The escaped term anywhere
    #[default]
    Contains,
    /// The escaped term between word boundaries
    Exact,
    /// The term used verbatim as a regular expression
    RegularExpression,
}

/// Which part of a document matching and replacing are restricted to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetScope {
    #[default]
    All,
    PageMetadata,
    SectionMetadata,
    Blocks,
    MainContent,
    CustomSelector(String),
}

impl TargetScope {
    pub fn is_targeted(&self) -> bool {
        !matches!(self, TargetScope::All)
    }

    pub fn label(&self) -> &str {
        match self {
            TargetScope::All => "All Content",
            TargetScope::PageMetadata => "Page Metadata",
            TargetScope::SectionMetadata => "Section Metadata",
            TargetScope::Blocks => "Blocks",
            TargetScope::MainContent => "Main Content",
            TargetScope::CustomSelector(selector) => selector,
        }
    }
}

/// What a selected match is replaced with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Replacement {
    /// Literal text; `$1`, `$2`… expand capture groups in regular-expression mode
    Text(String),
    /// Remove the match. Written as `&nbsp;` so required elements never end up
    /// empty, except in HTML-block mode where whole fragments are removed.
    Remove,
}

impl Replacement {
    pub const EMPTY_PLACEHOLDER: &'static str = "&nbsp;";

    pub fn describe(&self) -> String {
        match self {
            Replacement::Text(text) => format!("\"{}\"", text),
            Replacement::Remove => "(remove text)".to_string(),
        }
    }
}

/// The search configuration of one scan.
///
/// Everything except `replacement` feeds the match engine; those fields are
/// hashed into [`SearchConfig::fingerprint`] and must not change between the
/// detection pass and the replace pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchConfig {
    pub search_term: String,
    pub replacement: Option<Replacement>,
    pub search_type: SearchType,
    pub case_sensitive: bool,
    pub html_block_mode: bool,
    pub target_scope: TargetScope,
    pub exclude_urls_from_matching: bool,
    pub find_blank_pages_only: bool,
    pub find_json_files_only: bool,
}

impl SearchConfig {
    /// Convenience constructor for a plain `contains` search
    pub fn contains(term: impl Into<String>) -> Self {
        Self {
            search_term: term.into(),
            ..Self::default()
        }
    }

    pub fn with_replacement(mut self, replacement: Replacement) -> Self {
        self.replacement = Some(replacement);
        self
    }

    /// Whether a search term was given (surrounding whitespace ignored)
    pub fn has_term(&self) -> bool {
        !self.search_term.trim().is_empty()
    }

    /// Element-only discovery: a custom selector and no search term
    pub fn is_element_discovery(&self) -> bool {
        matches!(self.target_scope, TargetScope::CustomSelector(_)) && !self.has_term()
    }

    /// Scan modes whose results cannot be rewritten
    pub fn is_search_only(&self) -> bool {
        self.find_blank_pages_only || self.find_json_files_only || self.is_element_discovery()
    }

    /// Checks the configuration before a scan
    pub fn validate(&self) -> ScoutResult<()> {
        if self.find_blank_pages_only && self.find_json_files_only {
            return Err(ScoutError::config_error(
                "Blank-page and JSON discovery cannot be combined",
            ));
        }
        if let TargetScope::CustomSelector(selector) = &self.target_scope {
            if selector.trim().is_empty() {
                return Err(ScoutError::config_error(
                    "Please enter a CSS selector when using Custom Selector mode",
                ));
            }
        }
        let term_optional = self.find_blank_pages_only
            || self.find_json_files_only
            || matches!(self.target_scope, TargetScope::CustomSelector(_));
        if !self.has_term() && !term_optional {
            return Err(ScoutError::config_error("Please enter a search term"));
        }
        if self.search_type == SearchType::RegularExpression && self.has_term() {
            regex::Regex::new(self.search_term.trim())?;
        }
        if let Some(Replacement::Text(text)) = &self.replacement {
            if text.is_empty() {
                return Err(ScoutError::config_error(
                    "Replace term is required (or choose remove to delete text)",
                ));
            }
        }
        Ok(())
    }

    /// Checks that the configuration can drive a replace pass
    pub fn validate_for_replace(&self) -> ScoutResult<()> {
        self.validate()?;
        if self.find_json_files_only {
            return Err(ScoutError::config_error(
                "Replace is disabled in JSON search-only mode",
            ));
        }
        if self.find_blank_pages_only {
            return Err(ScoutError::config_error(
                "Replace is disabled in blank-page mode",
            ));
        }
        if self.is_element_discovery() {
            return Err(ScoutError::config_error(
                "Element discovery has no text to replace; add a search term",
            ));
        }
        if self.replacement.is_none() {
            return Err(ScoutError::config_error("A replacement is required"));
        }
        Ok(())
    }

    /// FNV-1a hash of the JSON form of every field that influences
    /// detection. Saved with sessions, so the value must not depend on the
    /// build.
    pub fn fingerprint(&self) -> u64 {
        let fields = DetectionFields {
            search_term: self.search_term.trim(),
            search_type: self.search_type,
            case_sensitive: self.case_sensitive,
            html_block_mode: self.html_block_mode,
            target_scope: &self.target_scope,
            exclude_urls_from_matching: self.exclude_urls_from_matching,
            find_blank_pages_only: self.find_blank_pages_only,
            find_json_files_only: self.find_json_files_only,
        };
        // Plain fields always serialize
        let bytes = serde_json::to_vec(&fields).unwrap_or_default();
        bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        })
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectionFields<'a> {
    search_term: &'a str,
    search_type: SearchType,
    case_sensitive: bool,
    html_block_mode: bool,
    target_scope: &'a TargetScope,
    exclude_urls_from_matching: bool,
    find_blank_pages_only: bool,
    find_json_files_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_requires_term() {
        assert!(SearchConfig::default().validate().is_err());
        assert!(SearchConfig::contains("Hello").validate().is_ok());

        let blank = SearchConfig {
            find_blank_pages_only: true,
            ..SearchConfig::default()
        };
        assert!(blank.validate().is_ok());

        let elements = SearchConfig {
            target_scope: TargetScope::CustomSelector(".hero".to_string()),
            ..SearchConfig::default()
        };
        assert!(elements.validate().is_ok());
        assert!(elements.is_element_discovery());
    }

    #[test]
    fn test_validation_rejects_bad_input() {
        let empty_selector = SearchConfig {
            target_scope: TargetScope::CustomSelector("  ".to_string()),
            ..SearchConfig::contains("x")
        };
        assert!(empty_selector.validate().is_err());

        let bad_regex = SearchConfig {
            search_type: SearchType::RegularExpression,
            ..SearchConfig::contains("(unclosed")
        };
        assert!(matches!(
            bad_regex.validate(),
            Err(ScoutError::InvalidPattern(_))
        ));

        let both_modes = SearchConfig {
            find_blank_pages_only: true,
            find_json_files_only: true,
            ..SearchConfig::default()
        };
        assert!(both_modes.validate().is_err());
    }

    #[test]
    fn test_replace_validation() {
        let config = SearchConfig::contains("Hello");
        assert!(config.validate_for_replace().is_err());

        let config = config.with_replacement(Replacement::Remove);
        assert!(config.validate_for_replace().is_ok());

        let json = SearchConfig {
            find_json_files_only: true,
            ..SearchConfig::contains("x").with_replacement(Replacement::Remove)
        };
        assert!(json.validate_for_replace().is_err());
    }

    #[test]
    fn test_fingerprint_ignores_replacement() {
        let base = SearchConfig::contains("Hello");
        let with_replacement = base
            .clone()
            .with_replacement(Replacement::Text("Hi".to_string()));
        assert_eq!(base.fingerprint(), with_replacement.fingerprint());

        let case_sensitive = SearchConfig {
            case_sensitive: true,
            ..base.clone()
        };
        assert_ne!(base.fingerprint(), case_sensitive.fingerprint());

        let scoped = SearchConfig {
            target_scope: TargetScope::Blocks,
            ..base.clone()
        };
        assert_ne!(base.fingerprint(), scoped.fingerprint());
    }

    #[test]
    fn test_fingerprint_is_fixed_across_builds() {
        assert_eq!(SearchConfig::contains("Hello").fingerprint(), 0x56b1_a78b_1996_0760);
        assert_eq!(
            SearchConfig::contains("  Hello ").fingerprint(),
            SearchConfig::contains("Hello").fingerprint()
        );
    }
}
