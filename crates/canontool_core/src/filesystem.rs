use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::rewrite::has_canonical_tag;
use crate::runtime::{ResolvedPaths, STATE_DIR_NAME, normalize_path};

/// One discovered HTML document, read once per run and discarded after
/// processing.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedFile {
    pub relative_path: String,
    /// Root-relative parent directory with forward slashes; empty for files
    /// directly in the site root.
    pub directory: String,
    /// Filename without the .html extension.
    pub stem: String,
    pub content_hash: String,
    pub bytes: u64,
}

impl ScannedFile {
    pub fn absolute_path(&self, paths: &ResolvedPaths) -> PathBuf {
        absolute_from_relative(&paths.site_root, &self.relative_path)
    }
}

/// Recursively discover every `.html` file under the site root, sorted by
/// relative path. Non-HTML files are never touched.
pub fn scan_html_files(paths: &ResolvedPaths) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(&paths.site_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != STATE_DIR_NAME);
    for entry in walker {
        let entry = entry
            .with_context(|| format!("failed to walk {}", normalize_path(&paths.site_root)))?;
        if !entry.file_type().is_file() || !has_html_extension(entry.path()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&paths.site_root)
            .with_context(|| format!("path escapes site root: {}", entry.path().display()))?;
        let relative_path = normalize_relative(relative);
        let (directory, filename) = match relative_path.rsplit_once('/') {
            Some((dir, name)) => (dir.to_string(), name),
            None => (String::new(), relative_path.as_str()),
        };
        let stem = filename
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| filename.to_string());
        let content = fs::read(entry.path())
            .with_context(|| format!("failed to read {}", entry.path().display()))?;
        files.push(ScannedFile {
            directory,
            stem,
            content_hash: sha256_hex(&content),
            bytes: content.len() as u64,
            relative_path,
        });
    }
    files.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
    Ok(files)
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    pub total_files: usize,
    pub with_canonical: usize,
    pub without_canonical: usize,
    pub by_directory: BTreeMap<String, usize>,
}

pub fn scan_stats(paths: &ResolvedPaths) -> Result<ScanStats> {
    let files = scan_html_files(paths)?;
    let mut by_directory: BTreeMap<String, usize> = BTreeMap::new();
    let mut with_canonical = 0usize;

    for file in &files {
        let key = if file.directory.is_empty() {
            ".".to_string()
        } else {
            file.directory.clone()
        };
        *by_directory.entry(key).or_insert(0) += 1;
        let absolute = file.absolute_path(paths);
        let content = fs::read_to_string(&absolute)
            .with_context(|| format!("failed to read {}", absolute.display()))?;
        if has_canonical_tag(&content) {
            with_canonical += 1;
        }
    }

    Ok(ScanStats {
        total_files: files.len(),
        with_canonical,
        without_canonical: files.len() - with_canonical,
        by_directory,
    })
}

fn has_html_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("html"))
}

fn normalize_relative(relative: &Path) -> String {
    let mut output = String::new();
    for component in relative.components() {
        if !output.is_empty() {
            output.push('/');
        }
        output.push_str(&component.as_os_str().to_string_lossy());
    }
    output
}

pub fn absolute_from_relative(site_root: &Path, relative: &str) -> PathBuf {
    let mut output = site_root.to_path_buf();
    for segment in relative.split('/') {
        if !segment.is_empty() {
            output.push(segment);
        }
    }
    output
}

fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{scan_html_files, scan_stats};
    use crate::runtime::{PathOverrides, ResolutionContext, resolve_paths};

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    fn paths_for(root: &Path) -> crate::runtime::ResolvedPaths {
        let context = ResolutionContext {
            cwd: root.to_path_buf(),
        };
        resolve_paths(&context, &PathOverrides::default()).expect("resolve")
    }

    #[test]
    fn scan_finds_only_html_sorted_by_relative_path() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(&root.join("posts/b.html"), "<title>B</title>");
        write_file(&root.join("a.html"), "<title>A</title>");
        write_file(&root.join("style.css"), "body {}");
        write_file(&root.join("notes.txt"), "notes");
        write_file(&root.join(".canontool/config.toml"), "[site]\n");

        let files = scan_html_files(&paths_for(root)).expect("scan");
        let relative: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(relative, ["a.html", "posts/b.html"]);
    }

    #[test]
    fn scan_splits_directory_and_stem() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(&root.join("blog/2024/entry.html"), "<title>E</title>");
        write_file(&root.join("index.html"), "<title>I</title>");

        let files = scan_html_files(&paths_for(root)).expect("scan");
        assert_eq!(files[0].directory, "blog/2024");
        assert_eq!(files[0].stem, "entry");
        assert_eq!(files[1].directory, "");
        assert_eq!(files[1].stem, "index");
    }

    #[test]
    fn stats_count_canonical_presence_per_directory() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        write_file(
            &root.join("a.html"),
            "<title>A</title>\n<link rel=\"canonical\" href=\"https://example.com/a.html\">",
        );
        write_file(&root.join("posts/b.html"), "<title>B</title>");
        write_file(&root.join("posts/c.html"), "<title>C</title>");

        let stats = scan_stats(&paths_for(root)).expect("stats");
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.with_canonical, 1);
        assert_eq!(stats.without_canonical, 2);
        assert_eq!(stats.by_directory.get("."), Some(&1));
        assert_eq!(stats.by_directory.get("posts"), Some(&2));
    }
}
