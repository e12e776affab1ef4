//! Chromium bookmark indexing library.
//!
//! This crate keeps a searchable index of Chromium-family browser bookmarks:
//! - Permissive, cancellable parsing of `Bookmarks` JSON files
//! - Single-worker background indexing that drops superseded results
//! - A read-only mirror of the browser's `Favicons` database
//! - File watching, profile discovery and persisted settings

pub mod cancel;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod favicon;
pub mod icon;
pub mod parser;
pub mod profile;
pub mod settings;
pub mod types;
pub mod watcher;

// Re-export main types
pub use cancel::{CancellationToken, GenerationTracker};
pub use coordinator::{CoordinatorConfig, IndexCoordinator, SearchIndex};
pub use error::{BookmarksError, Result};
pub use executor::BackgroundExecutor;
pub use favicon::{FaviconCache, FaviconHandle};
pub use icon::{bookmark_icon, FaviconImage, Icon, Rect, Size};
pub use parser::{parse_bookmark_file, parse_bookmarks, FOLDER_SEPARATOR};
pub use profile::{default_bookmark_paths, BrowserProfile, ProfileError};
pub use settings::{JsonFileSettingsStore, MemorySettingsStore, Settings, SettingsStore};
pub use types::{BookmarkAction, BookmarkRecord, IndexEntry, IndexStatus};
pub use watcher::{NotifyWatchService, WatchService};
