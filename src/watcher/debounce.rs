// file: src/watcher/debounce.rs
// version: 1.0.0
// guid: ffb432ce-2143-4c5b-9773-472db6648e67

//! Burst coalescing for file change events

use super::{ChangeBatch, ChangeKind, FileChange, WatchEvent};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

/// Collects changes until the watched tree has been quiet for one window.
///
/// Every change pushes the deadline out again, so a burst of any length
/// produces exactly one batch.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: BTreeMap<PathBuf, ChangeKind>,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
            deadline: None,
        }
    }

    /// Record a change observed at `now`
    pub fn push(&mut self, change: FileChange, now: Instant) {
        trace!("Debouncing {:?} {}", change.kind, change.path.display());
        self.pending.insert(change.path, change.kind);
        self.deadline = Some(now + self.window);
    }

    /// When the current burst closes, if one is open
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Take the batch if the burst has closed by `now`
    pub fn poll(&mut self, now: Instant) -> Option<ChangeBatch> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Take whatever is pending regardless of the deadline
    pub fn flush(&mut self) -> Option<ChangeBatch> {
        self.deadline = None;
        if self.pending.is_empty() {
            return None;
        }
        let changes = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(path, kind)| FileChange { path, kind })
            .collect();
        Some(ChangeBatch { changes })
    }
}

/// Turn raw watch events into debounced batches until either side closes
pub async fn debounce_changes(
    mut events: UnboundedReceiver<WatchEvent>,
    window: Duration,
    batches: UnboundedSender<ChangeBatch>,
) {
    let mut debouncer = Debouncer::new(window);

    loop {
        let deadline = debouncer.deadline();

        tokio::select! {
            event = events.recv() => match event {
                Some(WatchEvent::Change(change)) => debouncer.push(change, Instant::now()),
                Some(WatchEvent::Error(message)) => {
                    warn!("File watch error (continuing): {}", message);
                }
                None => {
                    if let Some(batch) = debouncer.flush() {
                        let _ = batches.send(batch);
                    }
                    debug!("Watch event stream closed");
                    break;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(batch) = debouncer.poll(Instant::now()) {
                    debug!("Burst closed with {} changed paths", batch.len());
                    if batches.send(batch).is_err() {
                        break;
                    }
                }
            }
        }
    }
}
