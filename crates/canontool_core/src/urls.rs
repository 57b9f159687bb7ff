use crate::config::RunConfig;
use crate::runtime::ResolvedPaths;

/// URL base segment for this run: the site root's own folder name when the
/// configuration asks for it, otherwise nothing.
pub fn resolve_base_segment(paths: &ResolvedPaths, config: &RunConfig) -> Option<String> {
    if config.include_base_path {
        paths.site_root_name()
    } else {
        None
    }
}

pub fn url_path(base_segment: Option<&str>, directory: &str) -> String {
    match (base_segment, directory.is_empty()) {
        (Some(base), true) => base.to_string(),
        (Some(base), false) => format!("{base}/{directory}"),
        (None, _) => directory.to_string(),
    }
}

/// Canonical absolute URL for one file. Pure function of its inputs; the
/// domain has already been validated.
pub fn canonical_url(
    domain: &str,
    base_segment: Option<&str>,
    directory: &str,
    stem: &str,
) -> String {
    let path = url_path(base_segment, directory);
    if path.is_empty() {
        format!("https://{domain}/{stem}.html")
    } else {
        format!("https://{domain}/{path}/{stem}.html")
    }
}
