//! Chromium bookmark file parsing.
//!
//! A bookmark file is a JSON document with a `roots` object whose values are
//! folder nodes. Folders carry `name` and `children`; leaves carry `name`,
//! `url` and a stable `guid`. The walk is depth-first in document order and
//! polls a [`CancellationToken`] before every child, so a cancelled parse
//! returns a prefix of the full result.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::types::BookmarkRecord;

/// Separator between folder names in a breadcrumb.
pub const FOLDER_SEPARATOR: &str = " → ";

/// Parses every bookmark file in `paths`, in order.
///
/// Unreadable files are skipped. If `cancel` fires, the records emitted so
/// far are returned.
pub fn parse_bookmarks(paths: &[PathBuf], cancel: &CancellationToken) -> Vec<Arc<BookmarkRecord>> {
    parse_paths(paths, cancel)
}

/// Polled by the walk before every file, root and child.
trait WalkCancel {
    /// `None` once the walk should stop.
    fn check(&self) -> Option<()>;
}

impl WalkCancel for CancellationToken {
    fn check(&self) -> Option<()> {
        CancellationToken::check(self)
    }
}

fn parse_paths<C: WalkCancel>(paths: &[PathBuf], cancel: &C) -> Vec<Arc<BookmarkRecord>> {
    let mut records = Vec::new();
    for path in paths {
        if cancel.check().is_none() || parse_file_into(path, cancel, &mut records).is_none() {
            break;
        }
    }
    records
}

/// Parses a single bookmark file.
pub fn parse_bookmark_file(path: &Path, cancel: &CancellationToken) -> Vec<Arc<BookmarkRecord>> {
    let mut records = Vec::new();
    let _ = parse_file_into(path, cancel, &mut records);
    records
}

/// Parses an in-memory bookmark document.
pub fn parse_bookmark_json(bytes: &[u8], cancel: &CancellationToken) -> Vec<Arc<BookmarkRecord>> {
    let mut records = Vec::new();
    match serde_json::from_slice::<Value>(bytes) {
        Ok(document) => {
            let _ = walk_document(&document, cancel, &mut records);
        }
        Err(error) => log::warn!("bookmark document is not valid JSON: {error}"),
    }
    records
}

/// Returns `None` if the walk was cancelled.
fn parse_file_into<C: WalkCancel>(
    path: &Path,
    cancel: &C,
    records: &mut Vec<Arc<BookmarkRecord>>,
) -> Option<()> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) => {
            log::warn!("could not open bookmarks file {}: {error}", path.display());
            return Some(());
        }
    };
    let document = match serde_json::from_slice::<Value>(&bytes) {
        Ok(document) => document,
        Err(error) => {
            log::warn!("bookmarks file {} is not valid JSON: {error}", path.display());
            return Some(());
        }
    };
    walk_document(&document, cancel, records)
}

fn walk_document<C: WalkCancel>(
    document: &Value,
    cancel: &C,
    records: &mut Vec<Arc<BookmarkRecord>>,
) -> Option<()> {
    let Some(roots) = document.get("roots").and_then(Value::as_object) else {
        log::debug!("bookmark document has no roots object");
        return Some(());
    };
    for root in roots.values() {
        cancel.check()?;
        if root.is_object() {
            walk_node("", root, cancel, records)?;
        }
    }
    Some(())
}

fn walk_node<C: WalkCancel>(
    folder_path: &str,
    node: &Value,
    cancel: &C,
    records: &mut Vec<Arc<BookmarkRecord>>,
) -> Option<()> {
    let name = string_field(node, "name");

    match string_field(node, "type") {
        "folder" => {
            let folder_path = if folder_path.is_empty() {
                name.to_string()
            } else {
                format!("{folder_path}{FOLDER_SEPARATOR}{name}")
            };
            let Some(children) = node.get("children").and_then(Value::as_array) else {
                return Some(());
            };
            for child in children {
                cancel.check()?;
                walk_node(&folder_path, child, cancel, records)?;
            }
        }
        "url" => {
            let url = string_field(node, "url");
            if name.is_empty() && url.is_empty() {
                log::debug!("skipping bookmark node without name and url");
                return Some(());
            }
            let id = match string_field(node, "guid") {
                "" => string_field(node, "id"),
                guid => guid,
            };
            records.push(Arc::new(BookmarkRecord::new(id, name, folder_path, url)));
        }
        _ => {}
    }
    Some(())
}

/// Absent or non-string fields read as empty.
fn string_field<'a>(node: &'a Value, key: &str) -> &'a str {
    node.get(key).and_then(Value::as_str).unwrap_or("")
}
