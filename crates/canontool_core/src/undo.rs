use std::fs;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

use crate::config::RunConfig;
use crate::filesystem::{ScannedFile, scan_html_files};
use crate::rewrite::build_canonical_tag;
use crate::runtime::ResolvedPaths;
use crate::urls::{canonical_url, resolve_base_segment};

#[derive(Debug, Clone, Default)]
pub struct UndoOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UndoAction {
    Stripped,
    Untouched,
    Error,
}

impl UndoAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stripped => "stripped",
            Self::Untouched => "untouched",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UndoFileResult {
    pub relative_path: String,
    pub action: UndoAction,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UndoReport {
    pub domain: String,
    pub include_base_path: bool,
    pub dry_run: bool,
    pub files_found: usize,
    pub stripped: usize,
    pub untouched: usize,
    pub errored: usize,
    pub results: Vec<UndoFileResult>,
}

/// Strip, from every HTML file, exactly the tag the given configuration
/// would have inserted there (same resolver, same shape). Tags pointing at
/// other URLs are left alone.
pub fn undo_inserted_tags(
    paths: &ResolvedPaths,
    config: &RunConfig,
    options: &UndoOptions,
) -> Result<UndoReport> {
    let files = scan_html_files(paths)?;
    let base_segment = resolve_base_segment(paths, config);

    let mut report = UndoReport {
        domain: config.domain.clone(),
        include_base_path: config.include_base_path,
        dry_run: options.dry_run,
        files_found: files.len(),
        stripped: 0,
        untouched: 0,
        errored: 0,
        results: Vec::with_capacity(files.len()),
    };

    for file in &files {
        let url = canonical_url(
            &config.domain,
            base_segment.as_deref(),
            &file.directory,
            &file.stem,
        );
        match undo_file(paths, file, &url, options) {
            Ok(action) => {
                match action {
                    UndoAction::Stripped => report.stripped += 1,
                    UndoAction::Untouched => report.untouched += 1,
                    UndoAction::Error => {}
                }
                report.results.push(UndoFileResult {
                    relative_path: file.relative_path.clone(),
                    action,
                    detail: None,
                });
            }
            Err(error) => {
                report.errored += 1;
                report.results.push(UndoFileResult {
                    relative_path: file.relative_path.clone(),
                    action: UndoAction::Error,
                    detail: Some(format!("{error:#}")),
                });
            }
        }
    }

    Ok(report)
}

fn undo_file(
    paths: &ResolvedPaths,
    file: &ScannedFile,
    url: &str,
    options: &UndoOptions,
) -> Result<UndoAction> {
    let absolute = file.absolute_path(paths);
    let content = fs::read_to_string(&absolute)
        .with_context(|| format!("failed to read {}", absolute.display()))?;
    let pattern = exact_tag_line_pattern(url)?;
    if !pattern.is_match(&content) {
        return Ok(UndoAction::Untouched);
    }
    let new_content = pattern.replace_all(&content, "").into_owned();
    if !options.dry_run {
        fs::write(&absolute, new_content)
            .with_context(|| format!("failed to write {}", absolute.display()))?;
    }
    Ok(UndoAction::Stripped)
}

// Matches the exact inserted tag shape, widened the same way stripping is:
// leading indentation plus at most one trailing line break.
fn exact_tag_line_pattern(url: &str) -> Result<Regex> {
    let tag = build_canonical_tag(url);
    Regex::new(&format!(r"[ \t]*{}[ \t]*\r?\n?", regex::escape(&tag)))
        .context("failed to build undo pattern")
}
