//! Bookmark records and the index entries derived from them.
//!
//! Records are produced in bulk by one parse pass and shared by reference
//! (`Arc`) between the coordinator and the entries handed to the search
//! index. Nothing mutates a record after construction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::favicon::FaviconHandle;
use crate::icon::{bookmark_icon, Icon, Size};

/// A single bookmark from a browser bookmark file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookmarkRecord {
    /// Stable browser-assigned identifier (the node's `guid`).
    pub id: String,
    /// Name shown for the bookmark.
    pub display_name: String,
    /// Ancestor folder names joined by [`crate::parser::FOLDER_SEPARATOR`].
    pub folder_path: String,
    /// Absolute URL.
    pub url: String,
}

impl BookmarkRecord {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        folder_path: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            folder_path: folder_path.into(),
            url: url.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.display_name
    }

    pub fn subtext(&self) -> &str {
        &self.folder_path
    }

    /// Text completed into the query input when the item is selected.
    pub fn input_action_text(&self) -> &str {
        &self.display_name
    }

    /// Host part of the URL, if the URL parses and has one.
    pub fn hostname(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_owned))
            .filter(|host| !host.is_empty())
    }

    /// Actions the host can offer for this bookmark.
    pub fn actions(&self) -> [BookmarkAction; 2] {
        [BookmarkAction::OPEN_URL, BookmarkAction::COPY_URL]
    }
}

/// Inert description of an action; the host performs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookmarkAction {
    pub id: &'static str,
    pub label: &'static str,
}

impl BookmarkAction {
    pub const OPEN_URL: Self = Self {
        id: "open-url",
        label: "Open URL",
    };
    pub const COPY_URL: Self = Self {
        id: "copy-url",
        label: "Copy URL to clipboard",
    };
}

/// One searchable string pointing at a bookmark.
///
/// A record yields an entry for its display name and, when hostname
/// indexing is enabled, a second one for its URL's hostname.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub record: Arc<BookmarkRecord>,
    pub text: String,
    favicons: FaviconHandle,
}

impl IndexEntry {
    pub fn new(record: Arc<BookmarkRecord>, text: impl Into<String>, favicons: FaviconHandle) -> Self {
        Self {
            record,
            text: text.into(),
            favicons,
        }
    }

    /// Handle to the favicon cache this entry was published with.
    pub fn favicons(&self) -> &FaviconHandle {
        &self.favicons
    }

    /// Resolves the icon to draw for this entry into a `target` sized tile.
    pub fn icon(&self, target: Size) -> Icon {
        bookmark_icon(self.favicons.icon_for_url(&self.record.url), target)
    }
}

/// Builds the index entries for a record set.
///
/// Every record gets a display-name entry, even when the name is empty.
pub fn build_index_entries(
    records: &[Arc<BookmarkRecord>],
    index_hostname: bool,
    favicons: &FaviconHandle,
) -> Vec<IndexEntry> {
    let capacity = if index_hostname { records.len() * 2 } else { records.len() };
    let mut entries = Vec::with_capacity(capacity);
    for record in records {
        entries.push(IndexEntry::new(
            record.clone(),
            record.display_name.clone(),
            favicons.clone(),
        ));
        if index_hostname {
            if let Some(host) = record.hostname() {
                entries.push(IndexEntry::new(record.clone(), host, favicons.clone()));
            }
        }
    }
    entries
}

/// Indexing status published after every accepted parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    /// Number of bookmarks in the current record set.
    pub bookmarks: usize,
    /// Runtime of the parse that produced the record set.
    pub last_runtime_ms: Option<u64>,
    /// Human-readable summary.
    pub message: String,
}

impl IndexStatus {
    pub fn indexed(bookmarks: usize, last_runtime_ms: Option<u64>) -> Self {
        let message = if bookmarks == 1 {
            "1 bookmark indexed.".to_string()
        } else {
            format!("{bookmarks} bookmarks indexed.")
        };
        Self {
            bookmarks,
            last_runtime_ms,
            message,
        }
    }
}
