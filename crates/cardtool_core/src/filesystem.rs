use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use walkdir::WalkDir;

use crate::runtime::{ResolvedPaths, STATE_DIR_NAME};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub recursive: bool,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannedPage {
    /// Project-relative path with `/` separators; doubles as the catalog page key.
    pub page_key: String,
    #[serde(skip)]
    pub absolute_path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub total_pages: usize,
    pub excluded_pages: usize,
    pub total_bytes: u64,
}

impl ScannedPage {
    pub fn read(&self) -> Result<String> {
        read_page(&self.absolute_path)
    }
}

/// List `*.html` pages under the project root sorted by page key.
pub fn scan_pages(paths: &ResolvedPaths, options: &ScanOptions) -> Result<Vec<ScannedPage>> {
    Ok(scan_pages_with_stats(paths, options)?.0)
}

pub fn scan_pages_with_stats(
    paths: &ResolvedPaths,
    options: &ScanOptions,
) -> Result<(Vec<ScannedPage>, ScanStats)> {
    let mut pages = Vec::new();
    let mut stats = ScanStats::default();
    if !paths.project_root.exists() {
        return Ok((pages, stats));
    }

    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(&paths.project_root)
        .follow_links(false)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry.path()));
    for entry in walker {
        let entry = entry
            .with_context(|| format!("failed to walk {}", paths.project_root.display()))?;
        if !entry.file_type().is_file() || !is_html(entry.path()) {
            continue;
        }
        let page_key = relative_key(&paths.project_root, entry.path())?;
        if options.exclude.iter().any(|excluded| *excluded == page_key) {
            stats.excluded_pages += 1;
            continue;
        }
        let bytes = entry
            .metadata()
            .with_context(|| format!("failed to inspect {}", entry.path().display()))?
            .len();
        stats.total_pages += 1;
        stats.total_bytes += bytes;
        pages.push(ScannedPage {
            page_key,
            absolute_path: entry.path().to_path_buf(),
            bytes,
        });
    }
    pages.sort_by(|left, right| left.page_key.cmp(&right.page_key));
    Ok((pages, stats))
}

/// Resolve a page argument to a page inside the project root.
pub fn locate_page(paths: &ResolvedPaths, page: &str) -> Result<ScannedPage> {
    let candidate = Path::new(page);
    let absolute = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        paths.project_root.join(candidate)
    };
    let normalized = normalize_pathbuf(&absolute);
    let root = normalize_pathbuf(&paths.project_root);
    if !normalized.starts_with(&root) {
        bail!(
            "page escapes the project root: {}\nproject root: {}",
            display_path(&normalized),
            display_path(&root)
        );
    }
    if !normalized.is_file() {
        bail!("page not found: {}", display_path(&normalized));
    }
    let bytes = fs::metadata(&normalized)
        .with_context(|| format!("failed to inspect {}", normalized.display()))?
        .len();
    Ok(ScannedPage {
        page_key: relative_key(&root, &normalized)?,
        absolute_path: normalized,
        bytes,
    })
}

pub fn read_page(path: &Path) -> Result<String> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("html"))
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name == STATE_DIR_NAME || name == "node_modules" || name.starts_with('.')
        })
}

fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).with_context(|| {
        format!(
            "{} is not under {}",
            path.display(),
            root.display()
        )
    })?;
    Ok(display_path(relative))
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn normalize_pathbuf(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
