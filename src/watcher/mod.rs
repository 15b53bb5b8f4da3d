// file: src/watcher/mod.rs
// version: 1.0.0
// guid: 06ee3f55-0643-4276-91e0-d8a7e3de59c6

//! File system monitoring for coverage-watch
//!
//! Wraps the `notify` crate: raw events are filtered by [`PathFilter`] on the
//! notify thread, forwarded over a tokio channel, and coalesced into
//! [`ChangeBatch`]es by [`debounce_changes`].

pub mod debounce;
pub mod filter;

pub use debounce::{debounce_changes, Debouncer};
pub use filter::PathFilter;

use crate::error::WatchError;
use crate::Result;
use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Kind of change observed on a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

/// A relevant change to a single path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Output of the notify callback
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Change(FileChange),
    /// Non-fatal watch failure, e.g. a permission error on a subdirectory
    Error(String),
}

/// Changes from one debounced burst, sorted by path with one entry per path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changes: Vec<FileChange>,
}

impl ChangeBatch {
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.changes.iter().map(|c| c.path.clone())
    }

    /// Fold a later batch into this one; later kinds win for repeated paths
    pub fn merge(&mut self, other: ChangeBatch) {
        for change in other.changes {
            match self.changes.iter_mut().find(|c| c.path == change.path) {
                Some(existing) => existing.kind = change.kind,
                None => self.changes.push(change),
            }
        }
        self.changes.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Short human description, e.g. `src/lib.rs (+2 more)`
    pub fn describe(&self, root: &Path) -> String {
        match self.changes.first() {
            None => "no changes".to_string(),
            Some(first) => {
                let shown = first.path.strip_prefix(root).unwrap_or(&first.path);
                if self.changes.len() == 1 {
                    shown.display().to_string()
                } else {
                    format!("{} (+{} more)", shown.display(), self.changes.len() - 1)
                }
            }
        }
    }
}

/// Recursive watcher over the configured directories
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl FileWatcher {
    /// Start watching every path recursively.
    ///
    /// Failing to install a watch is fatal; errors reported afterwards by the
    /// backend arrive as [`WatchEvent::Error`].
    pub fn start(
        paths: &[PathBuf],
        filter: PathFilter,
    ) -> Result<(Self, UnboundedReceiver<WatchEvent>)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| forward_event(res, &filter, &event_tx),
            NotifyConfig::default(),
        )?;

        let mut roots = Vec::with_capacity(paths.len());
        for path in paths {
            let root = path.canonicalize().map_err(|e| {
                WatchError::validation(format!(
                    "Cannot resolve watch path {}: {}",
                    path.display(),
                    e
                ))
            })?;

            watcher
                .watch(&root, RecursiveMode::Recursive)
                .map_err(|e| describe_watch_failure(&root, e))?;
            info!("Watching {}", root.display());
            roots.push(root);
        }

        Ok((
            Self {
                _watcher: watcher,
                roots,
            },
            event_rx,
        ))
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

fn forward_event(
    res: notify::Result<Event>,
    filter: &PathFilter,
    event_tx: &UnboundedSender<WatchEvent>,
) {
    match res {
        Ok(event) => {
            let Some(kind) = classify(&event.kind) else {
                return;
            };
            for path in event.paths {
                if filter.is_relevant(&path) {
                    debug!("{:?}: {}", kind, path.display());
                    let _ = event_tx.send(WatchEvent::Change(FileChange { path, kind }));
                }
            }
        }
        Err(e) => {
            let _ = event_tx.send(WatchEvent::Error(e.to_string()));
        }
    }
}

/// Map notify's event kinds onto the changes that warrant a new cycle.
/// Access and metadata-only events are dropped.
fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            Some(ChangeKind::Modified)
        }
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(_) => None,
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Any => Some(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Other => None,
    }
}

fn describe_watch_failure(root: &Path, error: notify::Error) -> WatchError {
    match &error.kind {
        notify::ErrorKind::MaxFilesWatch => {
            warn!("The system limit on watch handles was reached; on Linux raise fs.inotify.max_user_watches");
            WatchError::Watch(error)
        }
        notify::ErrorKind::PathNotFound => WatchError::validation(format!(
            "Watch path does not exist: {}",
            root.display()
        )),
        _ => WatchError::Watch(error),
    }
}
