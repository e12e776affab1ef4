//! Staleness-driven mirroring of the favicon database.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Bookkeeping for one mirrored favicon database.
///
/// The mirror, when present, was copied from a source whose modification
/// time is at most `last_mtime`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaviconCacheState {
    /// The browser-owned database.
    pub source_path: PathBuf,
    /// Private copy queried by lookups.
    pub mirror_path: PathBuf,
    /// Source mtime (seconds) observed at the last successful copy.
    pub last_mtime: Option<u64>,
    pub enabled: bool,
}

impl FaviconCacheState {
    pub fn new(source_path: PathBuf, mirror_path: PathBuf) -> Self {
        Self {
            source_path,
            mirror_path,
            last_mtime: None,
            enabled: false,
        }
    }

    /// True if the next refresh would copy.
    pub fn is_stale(&self) -> bool {
        if !self.mirror_path.exists() {
            return true;
        }
        match (source_mtime_secs(&self.source_path), self.last_mtime) {
            (Some(mtime), Some(last)) => mtime > last,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Modification time of `path` in whole seconds since the Unix epoch.
pub fn source_mtime_secs(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
}

/// Copies `source` over `mirror` if the source changed since `last_known`
/// or the mirror is missing.
///
/// Returns the mtime to remember: the source's mtime after a copy, otherwise
/// `last_known` unchanged. Copy failures are logged and leave both the mirror
/// and the bookkeeping untouched, so the next call retries.
pub fn refresh_if_stale(source: &Path, mirror: &Path, last_known: Option<u64>) -> Option<u64> {
    let Some(mtime) = source_mtime_secs(source) else {
        log::warn!("favicon database {} is not accessible", source.display());
        return last_known;
    };

    let mirror_present = mirror.exists();
    if mirror_present && last_known.is_some_and(|last| mtime <= last) {
        return last_known;
    }

    match copy_atomically(source, mirror) {
        Ok(bytes) => {
            log::info!(
                "mirrored favicon database source={} mirror={} bytes={bytes} mtime={mtime}",
                source.display(),
                mirror.display(),
            );
            Some(mtime)
        }
        Err(error) => {
            log::warn!(
                "failed to mirror favicon database {} to {}: {error}",
                source.display(),
                mirror.display()
            );
            last_known
        }
    }
}

/// Copies through a temp file in the mirror's directory, then renames it
/// over the mirror.
fn copy_atomically(source: &Path, mirror: &Path) -> io::Result<u64> {
    let parent = mirror
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut input = File::open(source)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    let bytes = io::copy(&mut input, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(mirror).map_err(|error| error.error)?;
    Ok(bytes)
}
