//! Filesystem watcher feeding [`ChangeEvent`]s to the render cache.
//!
//! Wraps `notify` behind the full debouncer so an editor's save burst
//! arrives as one batch. Event kinds map as follows:
//!
//! | notify | ChangeEvent |
//! |---|---|
//! | create, modify (data, metadata) | `Modified` |
//! | remove, rename (either side) | `Removed` |
//! | access, other | dropped |
//!
//! Renames map to `Removed` so entries under a moved directory are dropped.

use crate::event::{ChangeEvent, ChangeKind};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{DebounceEventResult, Debouncer, FileIdMap, new_debouncer};
use std::path::Path;
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;

/// Quiet period before a burst of events is delivered.
pub const DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// A running watcher. Dropping it stops watching.
pub struct SourceWatcher {
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
}

impl SourceWatcher {
    /// Watch `root` recursively, sending every change to `events`.
    pub fn start(root: &Path, events: Sender<ChangeEvent>) -> Result<Self, WatchError> {
        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            match result {
                Ok(batch) => {
                    for event in batch.iter() {
                        for change in changes(&event.event) {
                            tracing::debug!(
                                path = %change.path.display(),
                                kind = ?change.kind,
                                "source changed"
                            );
                            if events.send(change).is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    for err in errors {
                        tracing::warn!("watcher error: {err}");
                    }
                }
            }
        })?;
        debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching for changes");
        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

/// How a notify event kind affects cached renders, if at all.
fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            Some(ChangeKind::Removed)
        }
        EventKind::Create(_) | EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

fn changes(event: &notify::Event) -> Vec<ChangeEvent> {
    let Some(kind) = classify(&event.kind) else {
        return Vec::new();
    };
    event
        .paths
        .iter()
        .map(|path| ChangeEvent {
            path: path.clone(),
            kind,
        })
        .collect()
}
