//! Query connection over the favicon mirror.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use super::mirror::{refresh_if_stale, FaviconCacheState};
use crate::error::Result;
use crate::icon::FaviconImage;

/// Largest bitmap mapped to exactly one page URL.
pub const FAVICON_QUERY: &str = "
    SELECT fb.image_data, fb.width
    FROM icon_mapping im
    JOIN favicon_bitmaps fb ON fb.icon_id = im.icon_id
    WHERE im.page_url = ?1
    ORDER BY fb.width DESC
    LIMIT 1";

/// Owns the mirror of one favicon database and its single query connection.
///
/// Lookups and refreshes share the connection lock, so a lookup never sees
/// the mirror file while it is being replaced.
#[derive(Debug)]
pub struct FaviconCache {
    state: Mutex<FaviconCacheState>,
    connection: Mutex<Option<Connection>>,
}

impl FaviconCache {
    /// Builds the mirror from scratch and opens it.
    ///
    /// Fails if no usable mirror exists afterwards.
    pub fn open(source_path: impl Into<PathBuf>, mirror_path: impl Into<PathBuf>) -> Result<Self> {
        let mut state = FaviconCacheState::new(source_path.into(), mirror_path.into());
        state.last_mtime = refresh_if_stale(&state.source_path, &state.mirror_path, None);
        let connection = open_connection(&state.mirror_path)?;
        state.enabled = true;

        log::info!(
            "favicon cache opened source={} mirror={}",
            state.source_path.display(),
            state.mirror_path.display()
        );

        Ok(Self {
            state: Mutex::new(state),
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Snapshot of the mirror bookkeeping.
    pub fn state(&self) -> FaviconCacheState {
        self.state.lock().clone()
    }

    pub fn source_path(&self) -> PathBuf {
        self.state.lock().source_path.clone()
    }

    pub fn is_open(&self) -> bool {
        self.connection.lock().is_some()
    }

    /// Re-mirrors the source if it changed. Returns true if a copy happened.
    ///
    /// Holds the connection lock across close, copy and reopen.
    pub fn refresh(&self) -> bool {
        let mut state = self.state.lock();
        if !state.enabled || !state.is_stale() {
            return false;
        }

        let mut connection = self.connection.lock();
        drop(connection.take());

        let previous = state.last_mtime;
        state.last_mtime = refresh_if_stale(&state.source_path, &state.mirror_path, previous);

        match open_connection(&state.mirror_path) {
            Ok(reopened) => *connection = Some(reopened),
            Err(error) => log::warn!(
                "failed to reopen favicon mirror {}: {error}",
                state.mirror_path.display()
            ),
        }

        state.last_mtime != previous
    }

    /// Releases the query connection. Later lookups return `None`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.enabled = false;
        drop(self.connection.lock().take());
    }

    /// Largest favicon stored for exactly `url`.
    ///
    /// Misses and query failures return `None`.
    pub fn icon_for_url(&self, url: &str) -> Option<FaviconImage> {
        let connection = self.connection.lock();
        let connection = connection.as_ref()?;

        let row = connection.prepare_cached(FAVICON_QUERY).and_then(|mut statement| {
            statement
                .query_row(params![url], |row| {
                    Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Option<i64>>(1)?))
                })
                .optional()
        });

        match row {
            Ok(Some((data, width))) => {
                let width = width.and_then(|width| u32::try_from(width).ok()).unwrap_or(0);
                Some(FaviconImage::new(data, width, url))
            }
            Ok(None) => {
                log::debug!("no favicon found for url {url}");
                None
            }
            Err(error) => {
                log::debug!("favicon query failed for url {url}: {error}");
                None
            }
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(connection)
}

/// Read-only handle to the active favicon cache.
///
/// Handles do not keep the cache alive: once the owner drops it, lookups
/// through every outstanding handle return `None`.
#[derive(Debug, Clone, Default)]
pub struct FaviconHandle {
    cache: Weak<FaviconCache>,
}

impl FaviconHandle {
    pub fn new(cache: &Arc<FaviconCache>) -> Self {
        Self {
            cache: Arc::downgrade(cache),
        }
    }

    /// A handle that never yields icons.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.cache
            .upgrade()
            .is_some_and(|cache| cache.is_open())
    }

    pub fn icon_for_url(&self, url: &str) -> Option<FaviconImage> {
        self.cache.upgrade()?.icon_for_url(url)
    }
}
