use std::fs;
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Serialize;
use similar::TextDiff;

use crate::config::{Policy, RunConfig};
use crate::filesystem::{ScannedFile, scan_html_files};
use crate::runtime::ResolvedPaths;
use crate::urls::{canonical_url, resolve_base_segment};

static CANONICAL_TAG: OnceLock<Regex> = OnceLock::new();
static CANONICAL_LINE: OnceLock<Regex> = OnceLock::new();
static TITLE_CLOSE: OnceLock<Regex> = OnceLock::new();

fn canonical_tag_pattern() -> &'static Regex {
    CANONICAL_TAG.get_or_init(|| {
        Regex::new(r#"<link\b[^>]*rel\s*=\s*("canonical"|'canonical')[^>]*>"#)
            .expect("canonical tag pattern")
    })
}

// Same element match, widened to swallow leading indentation and at most one
// trailing line break so a tag on its own line vanishes without leaving a
// blank line behind.
fn canonical_line_pattern() -> &'static Regex {
    CANONICAL_LINE.get_or_init(|| {
        Regex::new(r#"[ \t]*<link\b[^>]*rel\s*=\s*("canonical"|'canonical')[^>]*>[ \t]*\r?\n?"#)
            .expect("canonical line pattern")
    })
}

fn title_close_pattern() -> &'static Regex {
    TITLE_CLOSE.get_or_init(|| Regex::new(r"(?i)</title\s*>").expect("title close pattern"))
}

/// Existence check only; a file with several canonical tags still counts once.
pub fn has_canonical_tag(content: &str) -> bool {
    canonical_tag_pattern().is_match(content)
}

/// Remove every canonical link element, attribute order and quote style
/// irrelevant, collapsing the line each tag occupied.
pub fn strip_canonical_tags(content: &str) -> String {
    canonical_line_pattern().replace_all(content, "").into_owned()
}

pub fn build_canonical_tag(url: &str) -> String {
    format!(r#"<link rel="canonical" href="{url}">"#)
}

fn line_break_for(content: &str) -> &'static str {
    if content.contains("\r\n") { "\r\n" } else { "\n" }
}

fn anchor_indent(content: &str, anchor_start: usize) -> &str {
    let line_start = content[..anchor_start]
        .rfind('\n')
        .map(|index| index + 1)
        .unwrap_or(0);
    let line = &content[line_start..anchor_start];
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

/// Insert a fresh canonical tag on its own line directly after the first
/// closing title element, reusing that line's indentation. Errors when the
/// content has no anchor.
pub fn insert_canonical_tag(content: &str, url: &str) -> Result<String> {
    let Some(anchor) = title_close_pattern().find(content) else {
        bail!("no closing </title> element to anchor the canonical tag");
    };
    let indent = anchor_indent(content, anchor.start());
    let tag = build_canonical_tag(url);
    let line_break = line_break_for(content);
    let mut output = String::with_capacity(content.len() + indent.len() + tag.len() + 2);
    output.push_str(&content[..anchor.end()]);
    output.push_str(line_break);
    output.push_str(indent);
    output.push_str(&tag);
    output.push_str(&content[anchor.end()..]);
    Ok(output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Inserted,
    Replaced,
    Removed,
    Skipped,
    Error,
}

impl FileAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced => "replaced",
            Self::Removed => "removed",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicyOutcome {
    pub action: FileAction,
    /// New content to write back; None when the file must not be touched.
    pub content: Option<String>,
}

/// The three-way policy branch. Pure text transform; file I/O stays with the
/// orchestration loop.
pub fn apply_policy(content: &str, url: &str, policy: Policy) -> Result<PolicyOutcome> {
    match policy {
        Policy::SkipExisting => {
            if has_canonical_tag(content) {
                Ok(PolicyOutcome {
                    action: FileAction::Skipped,
                    content: None,
                })
            } else {
                Ok(PolicyOutcome {
                    action: FileAction::Inserted,
                    content: Some(insert_canonical_tag(content, url)?),
                })
            }
        }
        Policy::ReplaceExisting => {
            if has_canonical_tag(content) {
                let stripped = strip_canonical_tags(content);
                Ok(PolicyOutcome {
                    action: FileAction::Replaced,
                    content: Some(insert_canonical_tag(&stripped, url)?),
                })
            } else {
                Ok(PolicyOutcome {
                    action: FileAction::Inserted,
                    content: Some(insert_canonical_tag(content, url)?),
                })
            }
        }
        // Always writes the stripped result back, present tag or not.
        Policy::RemoveOnly => Ok(PolicyOutcome {
            action: FileAction::Removed,
            content: Some(strip_canonical_tags(content)),
        }),
    }
}

#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub relative_path: String,
    pub action: FileAction,
    pub canonical_url: Option<String>,
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewriteReport {
    pub domain: String,
    pub policy: Policy,
    pub include_base_path: bool,
    pub dry_run: bool,
    pub files_found: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub results: Vec<FileResult>,
}

/// Run the configured policy over every HTML file under the site root,
/// strictly sequentially. A per-file failure is recorded and counted; the
/// remaining files are still processed.
pub fn rewrite_tree(
    paths: &ResolvedPaths,
    config: &RunConfig,
    options: &RewriteOptions,
) -> Result<RewriteReport> {
    let files = scan_html_files(paths)?;
    let base_segment = resolve_base_segment(paths, config);

    let mut report = RewriteReport {
        domain: config.domain.clone(),
        policy: config.policy,
        include_base_path: config.include_base_path,
        dry_run: options.dry_run,
        files_found: files.len(),
        processed: 0,
        skipped: 0,
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
        match rewrite_file(paths, file, &url, config.policy, options) {
            Ok(result) => {
                if result.action == FileAction::Skipped {
                    report.skipped += 1;
                } else {
                    report.processed += 1;
                }
                report.results.push(result);
            }
            Err(error) => {
                report.errored += 1;
                report.results.push(FileResult {
                    relative_path: file.relative_path.clone(),
                    action: FileAction::Error,
                    canonical_url: Some(url),
                    detail: Some(format!("{error:#}")),
                    diff: None,
                });
            }
        }
    }

    Ok(report)
}

fn rewrite_file(
    paths: &ResolvedPaths,
    file: &ScannedFile,
    url: &str,
    policy: Policy,
    options: &RewriteOptions,
) -> Result<FileResult> {
    let absolute = file.absolute_path(paths);
    let content = fs::read_to_string(&absolute)
        .with_context(|| format!("failed to read {}", absolute.display()))?;
    let outcome = apply_policy(&content, url, policy)?;

    let mut diff = None;
    if let Some(new_content) = &outcome.content {
        if options.dry_run {
            if new_content != &content {
                diff = Some(unified_diff(&file.relative_path, &content, new_content));
            }
        } else {
            fs::write(&absolute, new_content)
                .with_context(|| format!("failed to write {}", absolute.display()))?;
        }
    }

    let canonical_url = matches!(outcome.action, FileAction::Inserted | FileAction::Replaced)
        .then(|| url.to_string());
    Ok(FileResult {
        relative_path: file.relative_path.clone(),
        action: outcome.action,
        canonical_url,
        detail: None,
        diff,
    })
}

pub fn unified_diff(relative_path: &str, original: &str, modified: &str) -> String {
    let diff = TextDiff::from_lines(original, modified);
    diff.unified_diff()
        .context_radius(2)
        .header(relative_path, relative_path)
        .to_string()
}
