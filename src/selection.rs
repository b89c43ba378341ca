//! Host file selection
//!
//! Include and exclude sets use gitignore-style globs. Excludes always win:
//! a path matching both sets, or sitting under an excluded directory, is
//! never selected. A fixed default exclude list is merged in front of any
//! caller-supplied excludes and cannot be removed.

use crate::config::ConfigError;
use crate::error::PipelineError;
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, trace};

/// Directories and generated files that are never handed to a formatter.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/.git",
    "**/.gradle",
    "**/.eggs",
    "**/.mypy_cache",
    "**/.pytest_cache",
    "**/.tox",
    "**/.venv",
    "**/*.egg-info",
    "**/__pycache__",
    "**/build",
    "**/charts",
    "**/node_modules",
    "**/pnpm-lock.yaml",
];

/// Immutable include/exclude rules anchored at a root directory.
#[derive(Debug, Clone)]
pub struct FileSelection {
    root: PathBuf,
    include: Vec<String>,
    exclude: Vec<String>,
    include_matcher: Override,
    exclude_matcher: Override,
}

impl FileSelection {
    pub fn new<I, E, S, T>(root: impl Into<PathBuf>, include: I, exclude: E) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let root = root.into();
        let include: Vec<String> = include.into_iter().map(Into::into).collect();

        let mut merged: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        for pattern in exclude.into_iter().map(Into::into) {
            if !merged.contains(&pattern) {
                merged.push(pattern);
            }
        }

        let include_matcher = build_matcher(&root, &include)?;
        let exclude_matcher = build_matcher(&root, &merged)?;

        Ok(Self {
            root,
            include,
            exclude: merged,
            include_matcher,
            exclude_matcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    /// Effective exclude set: the defaults followed by caller additions.
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// True when `rel_path` or any of its parent directories is excluded.
    pub fn is_excluded(&self, rel_path: &Path, is_dir: bool) -> bool {
        if self.exclude_matcher.matched(rel_path, is_dir).is_whitelist() {
            return true;
        }
        rel_path
            .ancestors()
            .skip(1)
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .any(|ancestor| self.exclude_matcher.matched(ancestor, true).is_whitelist())
    }

    pub fn is_included(&self, rel_path: &Path) -> bool {
        self.include_matcher.matched(rel_path, false).is_whitelist()
    }

    /// Whether a file at `rel_path` belongs to the selection.
    pub fn matches(&self, rel_path: &Path) -> bool {
        self.is_included(rel_path) && !self.is_excluded(rel_path, false)
    }
}

fn build_matcher(root: &Path, patterns: &[String]) -> Result<Override, ConfigError> {
    let mut builder = OverrideBuilder::new(root);
    for pattern in patterns {
        if pattern.starts_with('!') {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: "negated patterns are not supported".to_string(),
            });
        }
        builder
            .add(pattern)
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
    }
    builder.build().map_err(|e| ConfigError::InvalidPattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

/// Walk the selection root and return matching files, relative to the root,
/// in sorted order.
pub fn select_files(selection: &FileSelection) -> Result<Vec<PathBuf>, PipelineError> {
    let root = selection.root();
    let selection_error = |message: String| PipelineError::Selection {
        root: root.to_path_buf(),
        message,
    };

    let metadata = std::fs::metadata(root).map_err(|e| selection_error(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(selection_error("not a directory".to_string()));
    }

    let start = Instant::now();
    let filter = selection.clone();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| match entry.path().strip_prefix(filter.root()) {
            Ok(rel) if !rel.as_os_str().is_empty() => {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !filter.exclude_matcher.matched(rel, is_dir).is_whitelist()
            }
            _ => true,
        })
        .build();

    let mut selected = Vec::new();
    for result in walker {
        let entry = result.map_err(|e| selection_error(e.to_string()))?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let rel_path = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| selection_error(e.to_string()))?
            .to_path_buf();

        if selection.matches(&rel_path) {
            trace!(path = %rel_path.display(), "Selected");
            selected.push(rel_path);
        }
    }

    selected.sort();
    selected.dedup();

    debug!(
        root = %root.display(),
        files = selected.len(),
        duration_ms = start.elapsed().as_millis(),
        "File selection complete"
    );
    Ok(selected)
}
