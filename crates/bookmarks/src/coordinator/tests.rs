use super::*;

use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant, UNIX_EPOCH};

use rusqlite::{params, Connection};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::icon::{Icon, Size};
use crate::settings::MemorySettingsStore;
use crate::watcher::ChangeHandler;

const TIMEOUT: Duration = Duration::from_secs(5);

struct RecordingIndex {
    tx: Mutex<Sender<Vec<IndexEntry>>>,
}

impl SearchIndex for RecordingIndex {
    fn set_index_items(&self, entries: Vec<IndexEntry>) {
        let _ = self.tx.lock().send(entries);
    }
}

#[derive(Default)]
struct FakeWatcher {
    files: Mutex<Vec<PathBuf>>,
    calls: Mutex<Vec<&'static str>>,
    handler: Mutex<Option<ChangeHandler>>,
}

impl FakeWatcher {
    fn fire(&self) {
        let handler = self.handler.lock().clone();
        let files = self.files();
        if let Some(handler) = handler {
            handler(&files);
        }
    }

    fn take_calls(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.calls.lock())
    }
}

impl WatchService for FakeWatcher {
    fn files(&self) -> Vec<PathBuf> {
        self.files.lock().clone()
    }

    fn add_paths(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        self.calls.lock().push("add");
        self.files.lock().extend(paths.iter().cloned());
        Vec::new()
    }

    fn remove_paths(&self, paths: &[PathBuf]) {
        self.calls.lock().push("remove");
        self.files.lock().retain(|file| !paths.contains(file));
    }

    fn set_change_handler(&self, handler: ChangeHandler) {
        *self.handler.lock() = Some(handler);
    }
}

struct Harness {
    dir: TempDir,
    published: Receiver<Vec<IndexEntry>>,
    watcher: Arc<FakeWatcher>,
    store: Arc<MemorySettingsStore>,
    coordinator: IndexCoordinator,
}

impl Harness {
    fn start(dir: TempDir, settings: Settings) -> Result<Self> {
        let (tx, published) = mpsc::channel();
        let watcher = Arc::new(FakeWatcher::default());
        let store = Arc::new(MemorySettingsStore::new(settings));
        let coordinator = IndexCoordinator::new(
            CoordinatorConfig::new(dir.path().join("cache")),
            Arc::new(RecordingIndex { tx: Mutex::new(tx) }),
            watcher.clone(),
            store.clone(),
        )?;
        Ok(Self {
            dir,
            published,
            watcher,
            store,
            coordinator,
        })
    }

    /// Waits for a publication satisfying `accept`, skipping earlier ones.
    fn wait_for(&self, accept: impl Fn(&[IndexEntry]) -> bool) -> Vec<IndexEntry> {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let entries = self
                .published
                .recv_timeout(remaining)
                .expect("index publication");
            if accept(&entries) {
                return entries;
            }
        }
    }

    fn wait_for_texts(&self, expected: &[&str]) -> Vec<IndexEntry> {
        self.wait_for(|entries| texts(entries) == expected)
    }
}

fn texts(entries: &[IndexEntry]) -> Vec<&str> {
    entries.iter().map(|entry| entry.text.as_str()).collect()
}

fn url_node(guid: &str, name: &str, url: &str) -> Value {
    json!({ "type": "url", "guid": guid, "name": name, "url": url })
}

fn write_bookmarks(profile_dir: &Path, children: Vec<Value>) -> PathBuf {
    fs::create_dir_all(profile_dir).expect("create profile dir");
    let path = profile_dir.join("Bookmarks");
    let document = json!({
        "roots": {
            "bookmark_bar": { "type": "folder", "name": "Work", "children": children }
        }
    });
    fs::write(&path, serde_json::to_vec(&document).expect("encode")).expect("write bookmarks");
    path
}

fn write_favicons(profile_dir: &Path, page_url: &str, width: i64) {
    let connection = Connection::open(profile_dir.join("Favicons")).expect("create favicons db");
    connection
        .execute_batch(
            "CREATE TABLE icon_mapping (id INTEGER PRIMARY KEY, page_url TEXT, icon_id INTEGER);
             CREATE TABLE favicon_bitmaps (id INTEGER PRIMARY KEY, icon_id INTEGER, width INTEGER, image_data BLOB);",
        )
        .expect("create tables");
    connection
        .execute(
            "INSERT INTO icon_mapping (page_url, icon_id) VALUES (?1, 1)",
            params![page_url],
        )
        .expect("insert mapping");
    connection
        .execute(
            "INSERT INTO favicon_bitmaps (icon_id, width, image_data) VALUES (1, ?1, ?2)",
            params![width, b"png".to_vec()],
        )
        .expect("insert bitmap");
}

fn set_mtime(path: &Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).expect("open for mtime");
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
        .expect("set mtime");
}

fn settings_for(paths: Vec<PathBuf>) -> Settings {
    Settings {
        bookmark_paths: Some(paths),
        ..Settings::default()
    }
}

#[test]
fn startup_publishes_parsed_bookmarks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_bookmarks(
        &dir.path().join("Default"),
        vec![url_node("g1", "Mail", "https://mail.example.com/")],
    );

    let harness = Harness::start(dir, settings_for(vec![path.clone()])).expect("start");
    let entries = harness.wait_for_texts(&["Mail"]);
    assert_eq!(
        *entries[0].record,
        BookmarkRecord::new("g1", "Mail", "Work", "https://mail.example.com/")
    );
    assert!(!entries[0].favicons().is_active());
    assert_eq!(harness.watcher.files(), vec![path.clone()]);
    assert_eq!(harness.coordinator.paths(), vec![path]);
    assert_eq!(harness.coordinator.bookmarks().len(), 1);
}

#[test]
fn empty_roots_publish_an_empty_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_bookmarks(&dir.path().join("Default"), Vec::new());

    let harness = Harness::start(dir, settings_for(vec![path])).expect("start");
    assert!(harness.wait_for(|_| true).is_empty());
    assert_eq!(harness.coordinator.status().message, "0 bookmarks indexed.");
}

#[test]
fn unreadable_file_yields_an_empty_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("Default").join("Bookmarks");

    let harness = Harness::start(dir, settings_for(vec![missing])).expect("start");
    assert!(harness.wait_for(|_| true).is_empty());
}

#[test]
fn status_follows_accepted_parses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_bookmarks(
        &dir.path().join("Default"),
        vec![url_node("g1", "Mail", "https://mail.example.com/")],
    );

    let harness = Harness::start(dir, settings_for(vec![path])).expect("start");
    let status = harness.coordinator.subscribe_status();
    harness.wait_for_texts(&["Mail"]);

    let current = status.borrow().clone();
    assert_eq!(current.bookmarks, 1);
    assert_eq!(current.message, "1 bookmark indexed.");
    assert!(current.last_runtime_ms.is_some());
}

#[test]
fn hostname_toggle_republishes_without_reparsing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_bookmarks(
        &dir.path().join("Default"),
        vec![
            url_node("a", "Mail", "https://mail.example.com/inbox"),
            url_node("b", "Docs", "https://docs.example.org/"),
            url_node("c", "Local", "file:///tmp/notes.txt"),
        ],
    );

    let harness = Harness::start(dir, settings_for(vec![path])).expect("start");
    harness.wait_for_texts(&["Mail", "Docs", "Local"]);
    let generation = harness.coordinator.inner.indexer.generation();

    harness.coordinator.set_index_hostname(true).expect("enable hostnames");
    let entries = harness.wait_for(|_| true);
    assert_eq!(
        texts(&entries),
        vec!["Mail", "mail.example.com", "Docs", "docs.example.org", "Local"]
    );
    assert!(Arc::ptr_eq(&entries[0].record, &entries[1].record));
    assert!(harness.store.snapshot().index_hostname);

    harness.coordinator.set_index_hostname(false).expect("disable hostnames");
    assert_eq!(texts(&harness.wait_for(|_| true)), vec!["Mail", "Docs", "Local"]);
    assert!(!harness.store.snapshot().index_hostname);
    assert_eq!(harness.coordinator.inner.indexer.generation(), generation);
}

#[test]
fn file_change_rewatches_and_reindexes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let profile = dir.path().join("Default");
    let path = write_bookmarks(&profile, vec![url_node("a", "Mail", "https://mail.example.com/")]);

    let harness = Harness::start(dir, settings_for(vec![path.clone()])).expect("start");
    harness.wait_for_texts(&["Mail"]);
    harness.watcher.take_calls();

    write_bookmarks(
        &profile,
        vec![
            url_node("a", "Mail", "https://mail.example.com/"),
            url_node("b", "Calendar", "https://calendar.example.com/"),
        ],
    );
    harness.watcher.fire();

    harness.wait_for_texts(&["Mail", "Calendar"]);
    assert_eq!(harness.watcher.take_calls(), vec!["remove", "add"]);
    assert_eq!(harness.watcher.files(), vec![path]);
}

#[test]
fn set_paths_retargets_watches_and_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = write_bookmarks(
        &dir.path().join("Default"),
        vec![url_node("a", "Mail", "https://mail.example.com/")],
    );
    let second = write_bookmarks(
        &dir.path().join("Profile 1"),
        vec![url_node("b", "News", "https://news.example.com/")],
    );

    let harness = Harness::start(dir, settings_for(vec![first])).expect("start");
    harness.wait_for_texts(&["Mail"]);

    harness
        .coordinator
        .set_paths(vec![second.clone(), second.clone()])
        .expect("set paths");
    harness.wait_for_texts(&["News"]);
    assert_eq!(harness.coordinator.paths(), vec![second.clone()]);
    assert_eq!(harness.watcher.files(), vec![second.clone()]);
    assert_eq!(harness.store.snapshot().bookmark_paths, Some(vec![second]));
}

#[test]
fn multiple_files_are_indexed_together() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = write_bookmarks(
        &dir.path().join("Default"),
        vec![url_node("a", "Mail", "https://mail.example.com/")],
    );
    let second = write_bookmarks(
        &dir.path().join("Profile 1"),
        vec![url_node("b", "News", "https://news.example.com/")],
    );

    let harness = Harness::start(dir, settings_for(vec![second, first])).expect("start");
    harness.wait_for_texts(&["Mail", "News"]);
}

#[test]
fn favicons_can_be_enabled_and_disabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let profile = dir.path().join("Default");
    let path = write_bookmarks(&profile, vec![url_node("a", "Mail", "https://mail.example.com/")]);
    write_favicons(&profile, "https://mail.example.com/", 48);

    let harness = Harness::start(dir, settings_for(vec![path])).expect("start");
    harness.wait_for_texts(&["Mail"]);

    harness.coordinator.set_show_favicons(true).expect("enable favicons");
    let entries = harness.wait_for(|_| true);
    assert!(entries[0].favicons().is_active());
    match entries[0].icon(Size::new(64, 64)) {
        Icon::Favicon(favicon) => {
            assert_eq!(favicon.width(), 48);
            assert_eq!(favicon.data(), b"png");
        }
        other => panic!("expected favicon, got {other:?}"),
    }
    assert!(harness.dir.path().join("cache").join(FAVICON_MIRROR_FILENAME).is_file());
    assert!(harness.store.snapshot().show_favicons);

    harness.coordinator.set_show_favicons(false).expect("disable favicons");
    let disabled = harness.wait_for(|_| true);
    assert!(!disabled[0].favicons().is_active());
    assert!(!entries[0].favicons().is_active());
    assert_eq!(entries[0].icon(Size::new(64, 64)), Icon::glyph());
    assert!(!harness.coordinator.favicon_handle().is_active());
    assert!(!harness.store.snapshot().show_favicons);
}

#[test]
fn enabling_favicons_without_a_database_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_bookmarks(
        &dir.path().join("Default"),
        vec![url_node("a", "Mail", "https://mail.example.com/")],
    );

    let harness = Harness::start(dir, settings_for(vec![path])).expect("start");
    harness.wait_for_texts(&["Mail"]);

    assert!(harness.coordinator.set_show_favicons(true).is_err());
    assert!(!harness.coordinator.show_favicons());
    assert!(!harness.store.snapshot().show_favicons);
}

#[test]
fn startup_with_favicons_enabled_builds_the_mirror() {
    let dir = tempfile::tempdir().expect("tempdir");
    let profile = dir.path().join("Default");
    let path = write_bookmarks(&profile, vec![url_node("a", "Mail", "https://mail.example.com/")]);
    write_favicons(&profile, "https://mail.example.com/", 16);

    let settings = Settings {
        show_favicons: true,
        ..settings_for(vec![path])
    };
    let harness = Harness::start(dir, settings).expect("start");
    let entries = harness.wait_for_texts(&["Mail"]);
    assert!(matches!(entries[0].icon(Size::new(64, 64)), Icon::Composed { .. }));
}

#[test]
fn newer_favicon_database_is_mirrored_after_a_change() {
    let dir = tempfile::tempdir().expect("tempdir");
    let profile = dir.path().join("Default");
    let path = write_bookmarks(&profile, vec![url_node("a", "Mail", "https://mail.example.com/")]);
    write_favicons(&profile, "https://mail.example.com/", 16);
    set_mtime(&profile.join("Favicons"), 1_000);

    let settings = Settings {
        show_favicons: true,
        ..settings_for(vec![path])
    };
    let harness = Harness::start(dir, settings).expect("start");
    let entries = harness.wait_for_texts(&["Mail"]);
    assert!(matches!(entries[0].icon(Size::new(64, 64)), Icon::Composed { .. }));

    fs::remove_file(profile.join("Favicons")).expect("remove favicons");
    write_favicons(&profile, "https://mail.example.com/", 64);
    set_mtime(&profile.join("Favicons"), 2_000);
    harness.watcher.fire();

    let entries = harness.wait_for(|entries| {
        matches!(
            entries.first().map(|entry| entry.icon(Size::new(64, 64))),
            Some(Icon::Favicon(favicon)) if favicon.width() == 64
        )
    });
    assert_eq!(texts(&entries), vec!["Mail"]);
}

#[test]
fn startup_fails_when_favicons_cannot_be_mirrored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_bookmarks(
        &dir.path().join("Default"),
        vec![url_node("a", "Mail", "https://mail.example.com/")],
    );

    let settings = Settings {
        show_favicons: true,
        ..settings_for(vec![path])
    };
    assert!(Harness::start(dir, settings).is_err());
}

#[test]
fn dropping_the_coordinator_stops_change_handling() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_bookmarks(
        &dir.path().join("Default"),
        vec![url_node("a", "Mail", "https://mail.example.com/")],
    );

    let harness = Harness::start(dir, settings_for(vec![path])).expect("start");
    harness.wait_for_texts(&["Mail"]);

    let Harness {
        published,
        watcher,
        coordinator,
        ..
    } = harness;
    drop(coordinator);
    watcher.take_calls();
    watcher.fire();
    assert!(watcher.take_calls().is_empty());
    assert!(published.recv_timeout(Duration::from_millis(200)).is_err());
}
