//! File change notifications.
//!
//! [`WatchService`] is the seam to whatever delivers change notifications for
//! the bookmark files. [`NotifyWatchService`] implements it on top of
//! `notify`. Watcher callbacks only signal a channel; a dispatcher thread
//! drains it and invokes the change handler, so handlers are free to
//! re-register watches.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Weak};
use std::thread;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};

use crate::error::{BookmarksError, Result};

/// Called with the currently watched files after one of them changed.
pub type ChangeHandler = Arc<dyn Fn(&[PathBuf]) + Send + Sync>;

pub trait WatchService: Send + Sync {
    /// Files currently watched.
    fn files(&self) -> Vec<PathBuf>;

    /// Starts watching `paths`. Returns the paths that could not be watched.
    fn add_paths(&self, paths: &[PathBuf]) -> Vec<PathBuf>;

    fn remove_paths(&self, paths: &[PathBuf]);

    fn set_change_handler(&self, handler: ChangeHandler);

    /// Drops every watch and registers `paths` afresh.
    ///
    /// A file replaced through rename keeps its path but not its watch.
    fn rewatch(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let watched = self.files();
        if !watched.is_empty() {
            self.remove_paths(&watched);
        }
        if paths.is_empty() {
            return Vec::new();
        }
        self.add_paths(paths)
    }
}

struct NotifyShared {
    watcher: Mutex<RecommendedWatcher>,
    files: Mutex<BTreeSet<PathBuf>>,
    handler: RwLock<Option<ChangeHandler>>,
}

/// [`WatchService`] backed by the platform's recommended `notify` watcher.
pub struct NotifyWatchService {
    shared: Arc<NotifyShared>,
}

impl std::fmt::Debug for NotifyWatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatchService")
            .field("files", &*self.shared.files.lock())
            .field("_watcher", &"<watcher>")
            .finish()
    }
}

impl NotifyWatchService {
    pub fn new() -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel::<()>();

        let watcher = recommended_watcher(move |event_result: notify::Result<Event>| {
            match event_result {
                Ok(event) if matches!(event.kind, EventKind::Access(_)) => {}
                Ok(_) => {
                    let _ = event_tx.send(());
                }
                Err(error) => log::warn!("bookmark file watcher error: {error}"),
            }
        })
        .map_err(|error| BookmarksError::Watch(format!("failed to create file watcher: {error}")))?;

        let shared = Arc::new(NotifyShared {
            watcher: Mutex::new(watcher),
            files: Mutex::new(BTreeSet::new()),
            handler: RwLock::new(None),
        });

        let dispatcher_shared = Arc::downgrade(&shared);
        thread::Builder::new()
            .name("bookmarks-watch".to_string())
            .spawn(move || dispatch_changes(event_rx, dispatcher_shared))?;

        Ok(Self { shared })
    }
}

impl WatchService for NotifyWatchService {
    fn files(&self) -> Vec<PathBuf> {
        self.shared.files.lock().iter().cloned().collect()
    }

    fn add_paths(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        let mut watcher = self.shared.watcher.lock();
        let mut files = self.shared.files.lock();
        let mut failed = Vec::new();
        for path in paths {
            match watcher.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    files.insert(path.clone());
                }
                Err(error) => {
                    log::debug!("failed to watch {}: {error}", path.display());
                    failed.push(path.clone());
                }
            }
        }
        failed
    }

    fn remove_paths(&self, paths: &[PathBuf]) {
        let mut watcher = self.shared.watcher.lock();
        let mut files = self.shared.files.lock();
        for path in paths {
            if files.remove(path) {
                // The watch may already be gone with a replaced inode.
                let _ = watcher.unwatch(path);
            }
        }
    }

    fn set_change_handler(&self, handler: ChangeHandler) {
        *self.shared.handler.write() = Some(handler);
    }
}

/// Exits once the watcher, and with it the sender, is dropped.
fn dispatch_changes(events: Receiver<()>, shared: Weak<NotifyShared>) {
    while events.recv().is_ok() {
        // Collapse a burst into one notification.
        while events.try_recv().is_ok() {}

        let Some(shared) = shared.upgrade() else {
            break;
        };
        let files: Vec<PathBuf> = shared.files.lock().iter().cloned().collect();
        let handler = shared.handler.read().clone();
        drop(shared);

        if let Some(handler) = handler {
            handler(&files);
        }
    }
}
