//! IndexCoordinator - keeps the published bookmark index in sync with the
//! bookmark files.
//!
//! Change notifications, configuration changes and startup all end in
//! `BackgroundExecutor::run()`. When a parse is accepted the coordinator swaps
//! its record set, refreshes the favicon mirror if the source changed, and
//! replaces the search index's entries in one call. Every state transition
//! happens under the coordinator's state lock, so they never interleave.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{BookmarksError, Result};
use crate::executor::BackgroundExecutor;
use crate::favicon::{FaviconCache, FaviconHandle};
use crate::parser::parse_bookmarks;
use crate::profile::{default_bookmark_paths, favicons_path_for, ProfileError};
use crate::settings::{Settings, SettingsStore};
use crate::types::{build_index_entries, BookmarkRecord, IndexEntry, IndexStatus};
use crate::watcher::WatchService;

#[cfg(test)]
mod tests;

/// File name of the favicon mirror inside the cache directory.
pub const FAVICON_MIRROR_FILENAME: &str = "favicons.sqlite";

/// Receiver of the flattened entries, e.g. a fuzzy text index.
pub trait SearchIndex: Send + Sync {
    /// Replaces every entry of the index.
    fn set_index_items(&self, entries: Vec<IndexEntry>);
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Directory holding the favicon mirror. Created if missing.
    pub cache_dir: PathBuf,
}

impl CoordinatorConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn mirror_path(&self) -> PathBuf {
        self.cache_dir.join(FAVICON_MIRROR_FILENAME)
    }
}

type Records = Vec<Arc<BookmarkRecord>>;

struct CoordinatorState {
    settings: Settings,
    /// Sorted bookmark files currently indexed.
    paths: Vec<PathBuf>,
    bookmarks: Records,
    favicons: Option<Arc<FaviconCache>>,
}

impl CoordinatorState {
    fn favicon_handle(&self) -> FaviconHandle {
        self.favicons
            .as_ref()
            .map(FaviconHandle::new)
            .unwrap_or_default()
    }
}

struct CoordinatorInner {
    state: Mutex<CoordinatorState>,
    indexer: BackgroundExecutor<Records>,
    search_index: Arc<dyn SearchIndex>,
    watcher: Arc<dyn WatchService>,
    settings_store: Arc<dyn SettingsStore>,
    mirror_path: PathBuf,
    status: watch::Sender<IndexStatus>,
}

/// Owns the current bookmark set and drives re-indexing.
pub struct IndexCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for IndexCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("IndexCoordinator")
            .field("paths", &state.paths)
            .field("bookmarks", &state.bookmarks.len())
            .field("favicons", &state.favicons.is_some())
            .field("indexer", &self.inner.indexer)
            .finish()
    }
}

impl IndexCoordinator {
    /// Loads settings, starts watching the bookmark files and kicks off the
    /// first parse.
    ///
    /// Fails if no bookmark file is configured or discoverable, the cache
    /// directory cannot be created, or favicons are enabled and the mirror
    /// cannot be opened.
    pub fn new(
        config: CoordinatorConfig,
        search_index: Arc<dyn SearchIndex>,
        watcher: Arc<dyn WatchService>,
        settings_store: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        let settings = settings_store.load()?;
        let paths = match &settings.bookmark_paths {
            Some(paths) => normalize_paths(paths.clone()),
            None => {
                let discovered = default_bookmark_paths();
                if discovered.is_empty() {
                    return Err(ProfileError::NoBrowserProfiles.into());
                }
                discovered
            }
        };

        fs::create_dir_all(&config.cache_dir).map_err(|error| {
            BookmarksError::Internal(format!(
                "failed to create cache directory {}: {error}",
                config.cache_dir.display()
            ))
        })?;
        let mirror_path = config.mirror_path();

        let favicons = if settings.show_favicons {
            Some(Arc::new(open_favicons(&paths, &mirror_path)?))
        } else {
            None
        };

        let indexer = BackgroundExecutor::new("bookmarks-indexer", |_| Vec::new(), |_| {})?;
        let (status, _) = watch::channel(IndexStatus::default());

        log::info!(
            "bookmark index init paths={} index_hostname={} favicons={}",
            paths.len(),
            settings.index_hostname,
            favicons.is_some(),
        );

        let inner = Arc::new(CoordinatorInner {
            state: Mutex::new(CoordinatorState {
                settings,
                paths,
                bookmarks: Vec::new(),
                favicons,
            }),
            indexer,
            search_index,
            watcher,
            settings_store,
            mirror_path,
            status,
        });

        let finish_inner = Arc::downgrade(&inner);
        inner.indexer.set_finish(move |records| {
            if let Some(inner) = finish_inner.upgrade() {
                inner.finish_indexing(records);
            }
        });

        let change_inner = Arc::downgrade(&inner);
        inner.watcher.set_change_handler(Arc::new(move |_files: &[PathBuf]| {
            if let Some(inner) = change_inner.upgrade() {
                inner.on_file_changed();
            }
        }));

        {
            let state = inner.state.lock();
            inner.retarget_indexer(&state);
        }
        inner.indexer.run();

        Ok(Self { inner })
    }

    /// Bookmark files currently indexed.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.inner.state.lock().paths.clone()
    }

    /// Replaces the indexed bookmark files, persists them and re-indexes.
    pub fn set_paths(&self, paths: Vec<PathBuf>) -> Result<()> {
        let paths = normalize_paths(paths);
        let mut state = self.inner.state.lock();
        state.paths = paths.clone();
        state.settings.bookmark_paths = Some(paths);
        self.inner.retarget_indexer(&state);
        self.inner.retarget_favicons(&mut state);
        let saved = self.inner.settings_store.save(&state.settings);
        drop(state);

        self.inner.indexer.run();
        saved
    }

    /// Replaces the indexed files with the discovered defaults.
    pub fn reset_paths(&self) -> Result<()> {
        self.set_paths(default_bookmark_paths())
    }

    pub fn index_hostname(&self) -> bool {
        self.inner.state.lock().settings.index_hostname
    }

    /// Toggles hostname entries and republishes the index.
    pub fn set_index_hostname(&self, enabled: bool) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.settings.index_hostname == enabled {
            return Ok(());
        }
        state.settings.index_hostname = enabled;
        self.inner.publish(&state);
        self.inner.settings_store.save(&state.settings)
    }

    pub fn show_favicons(&self) -> bool {
        self.inner.state.lock().settings.show_favicons
    }

    /// Enables or disables favicon decoration.
    ///
    /// Enabling builds the mirror from scratch before entries get a handle to
    /// it; if that fails the setting stays off and the error is returned.
    /// Disabling releases the mirror connection.
    pub fn set_show_favicons(&self, enabled: bool) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.settings.show_favicons == enabled && state.favicons.is_some() == enabled {
            return Ok(());
        }

        if enabled {
            let cache = open_favicons(&state.paths, &self.inner.mirror_path)?;
            state.favicons = Some(Arc::new(cache));
        } else if let Some(cache) = state.favicons.take() {
            cache.close();
        }

        state.settings.show_favicons = enabled;
        self.inner.publish(&state);
        self.inner.settings_store.save(&state.settings)
    }

    /// Handle to the active favicon cache, or a disabled one.
    pub fn favicon_handle(&self) -> FaviconHandle {
        self.inner.state.lock().favicon_handle()
    }

    /// Current record set.
    pub fn bookmarks(&self) -> Vec<Arc<BookmarkRecord>> {
        self.inner.state.lock().bookmarks.clone()
    }

    /// Re-registers the watches and re-indexes.
    pub fn on_file_changed(&self) {
        self.inner.on_file_changed();
    }

    /// Republishes entries for the current record set.
    pub fn update_index_items(&self) {
        let state = self.inner.state.lock();
        self.inner.publish(&state);
    }

    pub fn status(&self) -> IndexStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<IndexStatus> {
        self.inner.status.subscribe()
    }
}

impl CoordinatorInner {
    fn on_file_changed(&self) {
        {
            let state = self.state.lock();
            self.rewatch(&state.paths);
        }
        self.indexer.run();
    }

    fn rewatch(&self, paths: &[PathBuf]) {
        for path in self.watcher.rewatch(paths) {
            log::warn!("failed to watch bookmarks file {}", path.display());
        }
    }

    /// Points watches and the parse at the current paths.
    fn retarget_indexer(&self, state: &CoordinatorState) {
        self.rewatch(&state.paths);
        let paths = state.paths.clone();
        self.indexer
            .set_compute(move |cancel| parse_bookmarks(&paths, cancel));
    }

    /// Reopens the favicon mirror if the profile holding it changed.
    fn retarget_favicons(&self, state: &mut CoordinatorState) {
        if !state.settings.show_favicons {
            return;
        }
        let source = state.paths.first().and_then(|path| favicons_path_for(path));
        let current = state.favicons.as_ref().map(|cache| cache.source_path());
        if source.is_some() && source == current {
            return;
        }

        if let Some(cache) = state.favicons.take() {
            cache.close();
        }
        match open_favicons(&state.paths, &self.mirror_path) {
            Ok(cache) => state.favicons = Some(Arc::new(cache)),
            Err(error) => log::warn!("favicons unavailable for the new bookmark files: {error}"),
        }
    }

    fn finish_indexing(&self, records: Records) {
        let runtime_ms = self
            .indexer
            .last_runtime()
            .map(|runtime| u64::try_from(runtime.as_millis()).unwrap_or(u64::MAX));

        let mut state = self.state.lock();
        log::info!(
            "Indexed {} bookmarks [{} ms]",
            records.len(),
            runtime_ms.unwrap_or_default()
        );
        state.bookmarks = records;

        if let Some(cache) = &state.favicons {
            cache.refresh();
        }

        self.status
            .send_replace(IndexStatus::indexed(state.bookmarks.len(), runtime_ms));
        self.publish(&state);
    }

    fn publish(&self, state: &CoordinatorState) {
        let entries = build_index_entries(
            &state.bookmarks,
            state.settings.index_hostname,
            &state.favicon_handle(),
        );
        log::debug!("publishing {} index entries", entries.len());
        self.search_index.set_index_items(entries);
    }
}

fn normalize_paths(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort();
    paths.dedup();
    paths
}

/// Opens the mirror of the favicon database next to the first bookmark file.
fn open_favicons(paths: &[PathBuf], mirror_path: &Path) -> Result<FaviconCache> {
    let source = paths
        .first()
        .and_then(|path| favicons_path_for(path))
        .ok_or_else(|| {
            BookmarksError::InvalidInput(
                "no bookmarks file to locate the favicon database from".to_string(),
            )
        })?;
    FaviconCache::open(source, mirror_path)
}
