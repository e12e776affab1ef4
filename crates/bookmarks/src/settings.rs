//! Persisted configuration.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{BookmarksError, Result};

pub const SETTINGS_FILENAME: &str = "bookmarks.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bookmark files to index. `None` means "discover them".
    #[serde(rename = "bookmarks_path", skip_serializing_if = "Option::is_none")]
    pub bookmark_paths: Option<Vec<PathBuf>>,
    /// Also index each bookmark under its URL's hostname.
    #[serde(rename = "indexHostname")]
    pub index_hostname: bool,
    /// Decorate bookmarks with favicons from the browser.
    #[serde(rename = "showFavicons")]
    pub show_favicons: bool,
}

/// Seam to the host's settings persistence.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings>;
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// Stores settings as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
}

impl JsonFileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<dir>/bookmarks.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SETTINGS_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn load(&self) -> Result<Settings> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Settings::default())
            }
            Err(error) => {
                return Err(BookmarksError::Settings(format!(
                    "failed to read settings file {}: {error}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes).map_err(|error| {
            BookmarksError::Settings(format!(
                "failed to parse settings file {}: {error}",
                self.path.display()
            ))
        })
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                BookmarksError::Settings(format!(
                    "failed to create settings directory {}: {error}",
                    parent.display()
                ))
            })?;
        }
        let serialized = serde_json::to_vec_pretty(settings)?;
        fs::write(&self.path, serialized).map_err(|error| {
            BookmarksError::Settings(format!(
                "failed to write settings file {}: {error}",
                self.path.display()
            ))
        })
    }
}

/// Keeps settings in memory only.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }

    pub fn snapshot(&self) -> Settings {
        self.settings.lock().clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Settings> {
        Ok(self.snapshot())
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        *self.settings.lock() = settings.clone();
        Ok(())
    }
}
