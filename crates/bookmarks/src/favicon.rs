//! Favicon lookups against a private mirror of the browser's favicon database.
//!
//! - `mirror` - staleness check and full-file copy of the source database
//! - `cache` - the query connection over the mirror and single-icon lookups

mod cache;
mod mirror;

pub use cache::{FaviconCache, FaviconHandle, FAVICON_QUERY};
pub use mirror::{refresh_if_stale, source_mtime_secs, FaviconCacheState};
