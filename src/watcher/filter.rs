// file: src/watcher/filter.rs
// version: 1.0.0
// guid: da8e91a6-e5f2-42eb-b96b-f6821d22b7b5

//! Relevance filtering for changed paths

use crate::config::Config;
use crate::error::WatchError;
use crate::report::ReportPath;
use crate::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path, PathBuf};

/// Decides whether a changed path should trigger a coverage cycle
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    ignores: Gitignore,
    extensions: Vec<String>,
    excluded: Vec<PathBuf>,
}

impl PathFilter {
    /// Build a filter from gitignore-style patterns rooted at `root`
    ///
    /// The root is canonicalized when it exists, since the watcher reports
    /// paths under canonical watch roots.
    pub fn new(root: &Path, patterns: &[String], extensions: &[String]) -> Result<Self> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let mut builder = GitignoreBuilder::new(&root);
        for pattern in patterns {
            builder.add_line(None, pattern).map_err(|e| {
                WatchError::config(format!("Invalid ignore pattern {:?}: {}", pattern, e))
            })?;
        }
        let ignores = builder
            .build()
            .map_err(|e| WatchError::config(format!("Failed to build ignore rules: {}", e)))?;

        Ok(Self {
            root,
            ignores,
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            excluded: Vec::new(),
        })
    }

    /// Build the filter for a configuration. The report file and its staging
    /// directory are always excluded so writing a report never triggers a cycle.
    pub fn from_config(config: &Config, root: &Path) -> Result<Self> {
        let report = ReportPath::new(&config.coverage.output)?;
        let filter = Self::new(root, &config.watch.ignore, &config.watch.extensions)?
            .exclude(report.final_path())
            .exclude(report.staging_dir());
        Ok(filter)
    }

    /// Never report changes at or below `path`
    pub fn exclude(mut self, path: &Path) -> Self {
        let absolute = absolutize(&self.root, path);
        self.excluded.push(resolve_links(&absolute));
        self
    }

    /// Whether a change to `path` is relevant
    pub fn is_relevant(&self, path: &Path) -> bool {
        let absolute = absolutize(&self.root, path);
        if self.excluded.iter().any(|ex| absolute.starts_with(ex)) {
            return false;
        }

        let relative = relative_for_matching(&self.root, &absolute);
        if self
            .ignores
            .matched_path_or_any_parents(&relative, absolute.is_dir())
            .is_ignore()
        {
            return false;
        }

        if self.extensions.is_empty() {
            return true;
        }

        match absolute.extension().and_then(|e| e.to_str()) {
            Some(ext) => self
                .extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// Join `path` onto `root` when relative and drop `.` components, without
/// touching the file system (the path may already be deleted)
pub fn absolutize(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Canonicalize `path`, or its parent when the path itself does not exist
/// yet (the report and staging directory appear only after a run)
fn resolve_links(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => parent.join(name),
            Err(_) => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

/// Ignore matching needs a path under the root; paths outside it are matched
/// by their components alone
fn relative_for_matching(root: &Path, absolute: &Path) -> PathBuf {
    match absolute.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => absolute
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect(),
    }
}
