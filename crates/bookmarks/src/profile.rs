//! Browser profile discovery.
//!
//! Chromium-family browsers keep one directory per profile below their user
//! data directory. Each profile directory holds a `Bookmarks` JSON file and a
//! `Favicons` SQLite database; the user data directory holds `Local State`,
//! which maps profile directory names to display names.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde_json::Value;

/// Application directories searched for bookmark files.
pub const APP_DIRS: [&str; 6] = [
    "BraveSoftware",
    "Google/Chrome",
    "brave-browser",
    "chromium",
    "google-chrome",
    "vivaldi",
];

pub const BOOKMARKS_FILE_NAME: &str = "Bookmarks";
pub const FAVICONS_FILE_NAME: &str = "Favicons";
pub const LOCAL_STATE_FILE_NAME: &str = "Local State";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("Local State file not found: {0}")]
    MissingFile(PathBuf),

    #[error("Local State file {path} could not be read: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("Local State file is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Local State has no 'profile' object")]
    MissingProfile,

    #[error("Local State has no valid 'profile.info_cache' object")]
    MissingInfoCache,

    #[error("No profiles found.")]
    NoProfiles,

    #[error("No Chromium-based browser profiles found.")]
    NoBrowserProfiles,
}

/// A profile listed in `Local State`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    /// Directory name below the user data directory, e.g. `Default`.
    pub directory: String,
    /// Name shown by the browser.
    pub name: String,
}

/// Lists the profiles recorded in a `Local State` file, sorted by directory.
pub fn list_profiles(local_state: &Path) -> Result<Vec<BrowserProfile>, ProfileError> {
    let bytes = match fs::read(local_state) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProfileError::MissingFile(local_state.to_path_buf()))
        }
        Err(error) => {
            return Err(ProfileError::Unreadable {
                path: local_state.to_path_buf(),
                message: error.to_string(),
            })
        }
    };
    parse_local_state(&bytes)
}

/// Parses the contents of a `Local State` file.
pub fn parse_local_state(bytes: &[u8]) -> Result<Vec<BrowserProfile>, ProfileError> {
    let document: Value =
        serde_json::from_slice(bytes).map_err(|error| ProfileError::InvalidJson(error.to_string()))?;

    let profile = document
        .get("profile")
        .and_then(Value::as_object)
        .ok_or(ProfileError::MissingProfile)?;
    let info_cache = profile
        .get("info_cache")
        .and_then(Value::as_object)
        .ok_or(ProfileError::MissingInfoCache)?;

    let mut profiles: Vec<BrowserProfile> = info_cache
        .iter()
        .map(|(directory, info)| BrowserProfile {
            directory: directory.clone(),
            name: info
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(directory)
                .to_string(),
        })
        .collect();

    if profiles.is_empty() {
        return Err(ProfileError::NoProfiles);
    }
    profiles.sort_by(|a, b| a.directory.cmp(&b.directory));
    Ok(profiles)
}

pub fn profile_bookmarks_path(user_data_dir: &Path, profile_dir: &str) -> PathBuf {
    user_data_dir.join(profile_dir).join(BOOKMARKS_FILE_NAME)
}

pub fn profile_favicons_path(user_data_dir: &Path, profile_dir: &str) -> PathBuf {
    user_data_dir.join(profile_dir).join(FAVICONS_FILE_NAME)
}

/// The `Favicons` database belonging to the same profile as `bookmarks_path`.
pub fn favicons_path_for(bookmarks_path: &Path) -> Option<PathBuf> {
    bookmarks_path
        .parent()
        .map(|profile_dir| profile_dir.join(FAVICONS_FILE_NAME))
}

/// Finds every `Bookmarks` file below `root`.
pub fn discover_bookmark_files(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut found: Vec<PathBuf> = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                log::debug!("skipping unreadable entry below {}: {error}", root.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|file_type| file_type.is_file()))
        .filter(|entry| entry.file_name() == BOOKMARKS_FILE_NAME)
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

/// Directories whose browser subdirectories are searched by default.
pub fn search_roots() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = [dirs::data_dir(), dirs::config_dir()]
        .into_iter()
        .flatten()
        .collect();
    roots.dedup();
    roots
}

/// Bookmark files of all Chromium-family browsers found below `roots`.
pub fn default_bookmark_paths_in(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = roots
        .iter()
        .flat_map(|root| APP_DIRS.iter().map(move |app_dir| root.join(app_dir)))
        .flat_map(|app_root| discover_bookmark_files(&app_root))
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

/// Bookmark files found in the user's data and config directories.
pub fn default_bookmark_paths() -> Vec<PathBuf> {
    default_bookmark_paths_in(&search_roots())
}
