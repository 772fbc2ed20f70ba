//! The host abstraction (C1): everything the coordinator needs from the
//! filesystem and from the process environment, and nothing more.
//!
//! This is an external collaborator per spec: the coordinator only ever
//! speaks to a `dyn Host`. [`RealHost`] gives a genuine implementation
//! backed by `std::fs` and the `notify` crate (the watcher crate used
//! throughout the retrieval pack); [`MockHost`] backs the test suite the way
//! `rls_vfs::test::MockFileLoader` backs `rls-vfs`'s tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{trace, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

/// Kind of filesystem event a watcher callback receives, exactly the three
/// kinds named in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Changed,
    Deleted,
}

pub type WatchCallback = Box<dyn Fn(&Path, WatchEventKind) + Send + Sync>;

/// An opaque handle to a live watch. Dropping it tears down the watch.
/// Handles are held uniquely by their owner (a project, a script, or a
/// config-presence entry) per the resource model in spec §5.
pub struct WatchHandle {
    // Kept alive only for its `Drop` impl; field is otherwise unused.
    _inner: Box<dyn std::any::Any + Send>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WatchHandle")
    }
}

pub trait Host: Send + Sync {
    fn file_exists(&self, path: &Path) -> bool;
    fn read_file(&self, path: &Path) -> std::io::Result<String>;
    fn get_file_size(&self, path: &Path) -> std::io::Result<u64>;
    fn get_current_directory(&self) -> PathBuf;
    fn use_case_sensitive_file_names(&self) -> bool;
    fn create_hash(&self, data: &str) -> String;
    fn watch_file(&self, path: &Path, callback: WatchCallback) -> WatchHandle;
    fn watch_directory(&self, path: &Path, recursive: bool, callback: WatchCallback) -> WatchHandle;
}

/// Real host backed by the local filesystem.
pub struct RealHost {
    case_sensitive: bool,
}

impl RealHost {
    pub fn new() -> RealHost {
        RealHost { case_sensitive: cfg!(not(target_os = "windows")) && !cfg!(target_os = "macos") }
    }
}

impl Default for RealHost {
    fn default() -> Self {
        RealHost::new()
    }
}

impl Host for RealHost {
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_file(&self, path: &Path) -> std::io::Result<String> {
        fs::read_to_string(path)
    }

    fn get_file_size(&self, path: &Path) -> std::io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn get_current_directory(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    fn use_case_sensitive_file_names(&self) -> bool {
        self.case_sensitive
    }

    fn create_hash(&self, data: &str) -> String {
        let mut digest = sha1_smol::Sha1::new();
        digest.update(data.as_bytes());
        digest.digest().to_string()
    }

    fn watch_file(&self, path: &Path, callback: WatchCallback) -> WatchHandle {
        watch(path, RecursiveMode::NonRecursive, callback)
    }

    fn watch_directory(&self, path: &Path, recursive: bool, callback: WatchCallback) -> WatchHandle {
        let mode = if recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
        watch(path, mode, callback)
    }
}

fn watch(path: &Path, mode: RecursiveMode, callback: WatchCallback) -> WatchHandle {
    use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind};

    let watched_path = path.to_owned();
    let mut watcher: RecommendedWatcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                warn!("watch error for {:?}: {}", watched_path, err);
                return;
            }
        };
        let kind = match event.kind {
            EventKind::Create(CreateKind::Any) | EventKind::Create(CreateKind::File) => Some(WatchEventKind::Created),
            EventKind::Remove(RemoveKind::Any) | EventKind::Remove(RemoveKind::File) => Some(WatchEventKind::Deleted),
            EventKind::Modify(ModifyKind::Any) | EventKind::Modify(_) => Some(WatchEventKind::Changed),
            _ => None,
        };
        if let Some(kind) = kind {
            for changed in &event.paths {
                callback(changed, kind);
            }
        }
    }) {
        Ok(w) => w,
        Err(err) => {
            warn!("failed to create watcher for {:?}: {}", path, err);
            return WatchHandle { _inner: Box::new(()) };
        }
    };

    if let Err(err) = watcher.watch(path, mode) {
        trace!("failed to arm watch on {:?}: {}", path, err);
    }

    WatchHandle { _inner: Box::new(watcher) }
}

/// In-memory host for tests, mirroring `rls_vfs::test::MockFileLoader`: no
/// real I/O, fully deterministic, and watch registrations are recorded
/// instead of armed so tests can fire them explicitly.
type SharedWatchCallback = Arc<dyn Fn(&Path, WatchEventKind) + Send + Sync>;

#[derive(Default)]
pub struct MockHost {
    files: Mutex<HashMap<PathBuf, String>>,
    watches: Mutex<Vec<(PathBuf, SharedWatchCallback)>>,
    cwd: Mutex<PathBuf>,
}

impl MockHost {
    pub fn new() -> MockHost {
        MockHost { files: Mutex::new(HashMap::new()), watches: Mutex::new(Vec::new()), cwd: Mutex::new(PathBuf::from("/")) }
    }

    pub fn set_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files.lock().unwrap().insert(path.into(), contents.into());
    }

    pub fn remove_file(&self, path: &Path) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn set_current_directory(&self, path: impl Into<PathBuf>) {
        *self.cwd.lock().unwrap() = path.into();
    }

    /// Fires every watch callback registered for `path` with the given kind,
    /// the way a real filesystem event would.
    ///
    /// Snapshots the matching callbacks and releases the watch-list lock
    /// before invoking any of them: a callback may itself register a new
    /// watch (e.g. re-arming one during reload), which would deadlock
    /// against this same lock if still held.
    pub fn fire(&self, path: &Path, kind: WatchEventKind) {
        let matching: Vec<SharedWatchCallback> = {
            let watches = self.watches.lock().unwrap();
            watches.iter().filter(|(watched, _)| path.starts_with(watched) || watched == path).map(|(_, callback)| Arc::clone(callback)).collect()
        };
        for callback in matching {
            callback(path, kind);
        }
    }

    pub fn watch_count(&self) -> usize {
        self.watches.lock().unwrap().len()
    }
}

impl Host for MockHost {
    fn file_exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn read_file(&self, path: &Path) -> std::io::Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "mock file not found"))
    }

    fn get_file_size(&self, path: &Path) -> std::io::Result<u64> {
        self.read_file(path).map(|s| s.len() as u64)
    }

    fn get_current_directory(&self) -> PathBuf {
        self.cwd.lock().unwrap().clone()
    }

    fn use_case_sensitive_file_names(&self) -> bool {
        true
    }

    fn create_hash(&self, data: &str) -> String {
        let mut digest = sha1_smol::Sha1::new();
        digest.update(data.as_bytes());
        digest.digest().to_string()
    }

    fn watch_file(&self, path: &Path, callback: WatchCallback) -> WatchHandle {
        self.watches.lock().unwrap().push((path.to_owned(), Arc::from(callback)));
        WatchHandle { _inner: Box::new(()) }
    }

    fn watch_directory(&self, path: &Path, _recursive: bool, callback: WatchCallback) -> WatchHandle {
        self.watches.lock().unwrap().push((path.to_owned(), Arc::from(callback)));
        WatchHandle { _inner: Box::new(()) }
    }
}

pub type SharedHost = Arc<dyn Host>;
