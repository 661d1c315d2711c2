//! Listing filters applied during discovery.
//!
//! Free functions over a single [`ListEntry`]; discovery combines them.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::api::ListEntry;

/// Checks whether a path is excluded by any fragment.
///
/// A fragment with a leading `/` matches anywhere in the path; a bare fragment
/// must start a path segment, so `drafts` excludes `/site/drafts/x.html` but
/// not `/site/old-drafts.html`.
pub fn is_excluded(path: &str, fragments: &[String]) -> bool {
    fragments
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .any(|fragment| {
            if fragment.starts_with('/') {
                path.contains(fragment)
            } else {
                path.contains(&format!("/{}", fragment))
            }
        })
}

/// Checks whether an entry has the wanted extension (case-insensitive)
pub fn has_extension(entry: &ListEntry, wanted: Option<&str>) -> bool {
    match (wanted, entry.ext.as_deref()) {
        (None, ext) => ext.is_some(),
        (Some(wanted), Some(ext)) => ext.eq_ignore_ascii_case(wanted),
        (Some(_), None) => false,
    }
}

/// Checks whether an entry was modified at or after `since`.
/// Entries without a modification time never pass a time filter.
pub fn modified_since(entry: &ListEntry, since: Option<SystemTime>) -> bool {
    match (since, entry.last_modified) {
        (None, _) => true,
        (Some(since), Some(seconds)) => UNIX_EPOCH + Duration::from_secs(seconds) >= since,
        (Some(_), None) => false,
    }
}

/// Whether a listed entry is a candidate file
pub fn should_include_file(
    entry: &ListEntry,
    extension: Option<&str>,
    exclude: &[String],
    since: Option<SystemTime>,
) -> bool {
    !entry.is_folder()
        && entry.last_modified.is_some()
        && has_extension(entry, extension)
        && !is_excluded(&entry.path, exclude)
        && modified_since(entry, since)
}

/// Whether a listed entry is a folder to descend into
pub fn should_descend(entry: &ListEntry, exclude: &[String]) -> bool {
    entry.is_folder() && !is_excluded(&entry.path, exclude)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_excluded() {
        let exclude = fragments(&["drafts", "/fragments/old", " "]);
        assert!(is_excluded("/acme/site/drafts/post.html", &exclude));
        assert!(is_excluded("/acme/site/fragments/old/nav.html", &exclude));
        assert!(!is_excluded("/acme/site/old-drafts.html", &exclude));
        assert!(!is_excluded("/acme/site/fragments/new.html", &exclude));
        assert!(!is_excluded("/acme/site/index.html", &[]));
    }

    #[test]
    fn test_has_extension() {
        let page = ListEntry::file("index.html", "/a/b/index.html", 1);
        let json = ListEntry::file("data.JSON", "/a/b/data.JSON", 1);
        assert!(has_extension(&page, Some("html")));
        assert!(!has_extension(&page, Some("json")));
        assert!(has_extension(&json, Some("json")));
        assert!(has_extension(&json, None));
        assert!(!has_extension(&ListEntry::folder("x", "/a/b/x"), None));
    }

    #[test]
    fn test_modified_since() {
        let entry = ListEntry::file("a.html", "/a/b/a.html", 1_000);
        let before = UNIX_EPOCH + Duration::from_secs(500);
        let after = UNIX_EPOCH + Duration::from_secs(2_000);
        assert!(modified_since(&entry, None));
        assert!(modified_since(&entry, Some(before)));
        assert!(!modified_since(&entry, Some(after)));
    }

    #[test]
    fn test_should_include_file() {
        let exclude = fragments(&["drafts"]);
        let page = ListEntry::file("a.html", "/a/b/a.html", 1);
        let draft = ListEntry::file("a.html", "/a/b/drafts/a.html", 1);
        let mut unsaved = ListEntry::file("new.html", "/a/b/new.html", 1);
        unsaved.last_modified = None;

        assert!(should_include_file(&page, Some("html"), &exclude, None));
        assert!(!should_include_file(&draft, Some("html"), &exclude, None));
        assert!(!should_include_file(&unsaved, Some("html"), &exclude, None));
        assert!(should_descend(&ListEntry::folder("blog", "/a/b/blog"), &exclude));
        assert!(!should_descend(&ListEntry::folder("drafts", "/a/b/drafts"), &exclude));
    }
}
