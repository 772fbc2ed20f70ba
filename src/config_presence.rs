//! Config-presence table (C3): per canonical configuration-file path, tracks
//! existence, the set of open files whose upward search has visited the
//! path, and an optional watcher, per the state machine in spec §4.3.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::host::WatchHandle;

/// The four states a presence entry can be in. Kept as a derived view rather
/// than a stored tag: the entry's state is always computable from its
/// fields, which is what keeps the invariant trivial to check (spec §9,
/// "recompute rather than maintain").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Absent,
    Ghost,
    GhostWatched,
    Adopted,
}

/// Per canonical config-file path entry.
pub struct ConfigPresenceEntry {
    pub exists: bool,
    /// script path -> is this script's open-file an inferred-root tracker
    pub tracking: HashMap<PathBuf, bool>,
    pub watcher: Option<WatchHandle>,
    has_configured_project: bool,
}

impl ConfigPresenceEntry {
    fn new(exists: bool) -> ConfigPresenceEntry {
        ConfigPresenceEntry { exists, tracking: HashMap::new(), watcher: None, has_configured_project: false }
    }

    pub fn state(&self) -> PresenceState {
        if self.has_configured_project {
            return PresenceState::Adopted;
        }
        if self.tracking.is_empty() {
            return PresenceState::Absent;
        }
        if self.tracking.values().any(|&is_root| is_root) {
            PresenceState::GhostWatched
        } else {
            PresenceState::Ghost
        }
    }

    pub fn has_root_tracker(&self) -> bool {
        self.tracking.values().any(|&is_root| is_root)
    }
}

/// Per-configuration-file-path cache, owned by the coordinator.
#[derive(Default)]
pub struct ConfigPresenceTable {
    entries: HashMap<PathBuf, ConfigPresenceEntry>,
}

impl ConfigPresenceTable {
    pub fn new() -> ConfigPresenceTable {
        ConfigPresenceTable { entries: HashMap::new() }
    }

    pub fn get(&self, path: &Path) -> Option<&ConfigPresenceEntry> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut ConfigPresenceEntry> {
        self.entries.get_mut(path)
    }

    pub fn remove_if_absent(&mut self, path: &Path) {
        if let Some(entry) = self.entries.get(path) {
            if matches!(entry.state(), PresenceState::Absent) {
                self.entries.remove(path);
            }
        }
    }

    /// Probes (creating the entry if missing) and records `script` as a
    /// tracker, per spec §4.1 step 3. Returns whether the path exists.
    pub fn probe_and_track(
        &mut self,
        exists_on_disk: impl FnOnce() -> bool,
        path: &Path,
        script: &Path,
        is_inferred_root: bool,
    ) -> bool {
        let entry = self.entries.entry(path.to_owned()).or_insert_with(|| ConfigPresenceEntry::new(exists_on_disk()));
        entry.tracking.insert(script.to_owned(), is_inferred_root);
        entry.exists
    }

    /// Marks `script` as the root of an Inferred project that tracks `path`,
    /// transitioning Ghost -> Ghost-watched (or Absent -> Ghost-watched) and
    /// arming a watcher if one was not already present.
    pub fn mark_inferred_root(&mut self, path: &Path, script: &Path) {
        let entry = self.entries.entry(path.to_owned()).or_insert_with(|| ConfigPresenceEntry::new(false));
        entry.tracking.insert(script.to_owned(), true);
    }

    /// Removes `script` as a tracker of `path`. If that was the last root
    /// tracker, the watcher should be dropped by the caller (returned via the
    /// bool) and the state collapses toward Ghost/Absent.
    pub fn untrack(&mut self, path: &Path, script: &Path) -> bool {
        let should_drop_watcher = if let Some(entry) = self.entries.get_mut(path) {
            entry.tracking.remove(script);
            !entry.has_root_tracker()
        } else {
            true
        };
        if let Some(entry) = self.entries.get(path) {
            if entry.tracking.is_empty() && !entry.has_configured_project {
                self.entries.remove(path);
                return true;
            }
        }
        should_drop_watcher
    }

    /// Marks that a Configured project now exists for `path`: state -> Adopted,
    /// any ghost watcher is dropped by the caller.
    pub fn adopt(&mut self, path: &Path) {
        let entry = self.entries.entry(path.to_owned()).or_insert_with(|| ConfigPresenceEntry::new(true));
        entry.exists = true;
        entry.has_configured_project = true;
        entry.watcher = None;
    }

    /// Marks that the Configured project for `path` was removed: state falls
    /// back to Ghost-watched (if a root tracker remains), Ghost, or Absent.
    pub fn unadopt(&mut self, path: &Path) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.has_configured_project = false;
            if entry.tracking.is_empty() {
                self.entries.remove(path);
            }
        }
    }

    pub fn all_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
