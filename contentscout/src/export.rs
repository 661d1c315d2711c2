use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::OrgSite;
use crate::errors::ScoutResult;
use crate::results::FileResult;
use crate::search::format_html;

/// Local file name for an exported document: its site-relative path with
/// separators flattened, so `/blog/2024/post.html` becomes `blog_2024_post.html`
pub fn export_file_name(org_site: &OrgSite, full_path: &str) -> String {
    org_site
        .relative_path(full_path)
        .trim_start_matches('/')
        .replace('/', "_")
}

/// Writes the selected results into `dir`, one pretty-printed file each.
///
/// Updated content is exported when a replace has run, the scanned content
/// otherwise. Returns the written paths.
pub fn export_selected(org_site: &OrgSite, results: &[FileResult], dir: &Path) -> ScoutResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for result in results.iter().filter(|r| r.is_selected()) {
        let target = dir.join(export_file_name(org_site, &result.file.path));
        let content = if result.is_json_file {
            result.current_content().to_string()
        } else {
            format_html(result.current_content())
        };
        fs::write(&target, content)?;
        debug!("Exported {} to {}", result.file.path, target.display());
        written.push(target);
    }
    info!("Exported {} files to {}", written.len(), dir.display());
    Ok(written)
}
