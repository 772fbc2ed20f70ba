//! Script registry (C2): the canonical store of every known file, open or
//! watched-closed, keyed by normalized path.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::host::{Host, WatchEventKind, WatchHandle};
use crate::project::ProjectKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Unknown,
    Js,
    Jsx,
    Ts,
    Tsx,
    /// External-declared file that mixes source with something opaque to the
    /// compiler (e.g. a template file). Implies `has_mixed_content`.
    ExternalMixed,
}

impl ScriptKind {
    pub fn is_mixed(self) -> bool {
        matches!(self, ScriptKind::ExternalMixed)
    }

    /// Whether the spec's size gate treats this extension as "source"
    /// (TypeScript-flavored) or counts it against the non-source budget.
    pub fn is_source_extension(self) -> bool {
        matches!(self, ScriptKind::Ts | ScriptKind::Tsx)
    }
}

/// A single known file.
///
/// Invariant (spec §3): a script is watched iff it is closed, not mixed, and
/// a known reference to it exists; it is never both open and watched.
pub struct Script {
    pub normalized_path: PathBuf,
    pub canonical_path: PathBuf,
    pub kind: ScriptKind,
    pub open: bool,
    /// In-memory contents; `Some` only while `open` is true.
    pub contents: Option<String>,
    pub containing_projects: HashSet<ProjectKey>,
    pub watcher: Option<WatchHandle>,
    pub has_mixed_content: bool,
}

impl Script {
    fn new(path: &Path, canonical: PathBuf, kind: ScriptKind) -> Script {
        Script {
            normalized_path: path.to_owned(),
            canonical_path: canonical,
            kind,
            open: false,
            contents: None,
            containing_projects: HashSet::new(),
            watcher: None,
            has_mixed_content: kind.is_mixed(),
        }
    }

    pub fn is_orphan(&self) -> bool {
        !self.open && self.containing_projects.is_empty()
    }

    /// Asserts the watcher invariant holds; used by property tests and as a
    /// cheap self-check after mutation. A violation is a coordinator bug, not
    /// a recoverable condition (spec §4.8).
    pub fn assert_watcher_invariant(&self) {
        let should_be_watched = !self.open && !self.has_mixed_content;
        assert_eq!(
            self.watcher.is_some(),
            should_be_watched,
            "watcher invariant violated for {:?}: open={} mixed={} watched={}",
            self.normalized_path,
            self.open,
            self.has_mixed_content,
            self.watcher.is_some()
        );
    }
}

/// Canonical store of every known script, keyed by normalized path.
#[derive(Default)]
pub struct ScriptRegistry {
    scripts: HashMap<PathBuf, Script>,
}

impl ScriptRegistry {
    pub fn new() -> ScriptRegistry {
        ScriptRegistry { scripts: HashMap::new() }
    }

    pub fn get(&self, path: &Path) -> Option<&Script> {
        self.scripts.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Script> {
        self.scripts.get_mut(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.scripts.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Script> {
        self.scripts.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Script> {
        self.scripts.values_mut()
    }

    /// Obtain the script at `path`, creating it (unwatched, closed) if this
    /// is the first reference to it.
    pub fn get_or_create(&mut self, path: &Path, kind: ScriptKind) -> &mut Script {
        self.scripts.entry(path.to_owned()).or_insert_with(|| Script::new(path, path.to_owned(), kind))
    }

    /// Removes a script whose membership is empty and which is closed.
    /// Returns the removed script, dropping (and thus releasing) its watcher.
    pub fn collect_garbage(&mut self, path: &Path) -> Option<Script> {
        let remove = self.scripts.get(path).map(|s| !s.open && s.containing_projects.is_empty()).unwrap_or(false);
        if remove {
            self.scripts.remove(path)
        } else {
            None
        }
    }

    /// Sweeps every closed script with empty membership. Used after batched
    /// close/detach operations (spec §4.1 step 7).
    pub fn sweep(&mut self) {
        self.scripts.retain(|_, s| s.open || !s.containing_projects.is_empty());
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

/// Arms a watcher on `script`'s disk path, unless it is mixed-content (which
/// is never watched per spec §3). `on_event` is invoked with the script's
/// normalized path on every filesystem notification.
pub fn arm_watch(
    host: &dyn Host,
    script: &mut Script,
    on_event: impl Fn(&Path, WatchEventKind) + Send + Sync + 'static,
) {
    if script.has_mixed_content {
        return;
    }
    let path = script.normalized_path.clone();
    script.watcher = Some(host.watch_file(&path, Box::new(on_event)));
}

pub fn disarm_watch(script: &mut Script) {
    script.watcher = None;
}
