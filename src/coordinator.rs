//! The coordinator (C8): open/close/change reconciliation, config discovery
//! by upward search, inferred-project rebalancing, and watcher lifecycle.
//! This is the 47%-share component spec §2 calls "where the real engineering
//! lives"; everything else in this crate exists to support it.
//!
//! Mutation is funneled through a single `Mutex<State>`, matching the
//! single-threaded-cooperative contract of spec §5: only one logical thread
//! ever holds the lock at a time, even though debounce timers fire on
//! background threads (`rls::build::BuildQueue` uses the same trick --
//! a single mutex around `CompilationContext` -- to let a background build
//! thread mutate shared state safely).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::collaborators::{ConfigFileParser, NullConfigFileParser, NullTypingsInstaller, TypingsInstaller};
use crate::config::{HostConfiguration, HostConfigurationUpdate};
use crate::config_presence::{ConfigPresenceTable, PresenceState};
use crate::error::CoordinatorError;
use crate::events::{ConfigFileDiagnostics, Event, EventSink, NullEventSink, ProjectInfoTelemetry};
use crate::host::{Host, WatchEventKind};
use crate::project::{CompilerOptions, Project, ProjectKey};
use crate::safelist::Safelist;
use crate::scheduler::{DebounceScheduler, REFRESH_INFERRED_PROJECTS};
use crate::script::{arm_watch, disarm_watch, ScriptKind, ScriptRegistry};
use crate::size_gate::{CandidateFile, GateDecision, SizeGate};

/// Names of the two recognized configuration filenames, probed primary-then-
/// secondary at every level of the upward search (spec §4.1 step 3). Left
/// configurable rather than hardcoded since the spec does not name them.
#[derive(Debug, Clone)]
pub struct ConfigFileNames {
    pub primary: String,
    pub secondary: String,
}

impl Default for ConfigFileNames {
    fn default() -> Self {
        ConfigFileNames { primary: "project.json".into(), secondary: "project.local.json".into() }
    }
}

pub struct OpenFileArgs {
    pub path: PathBuf,
    pub contents: Option<String>,
    pub kind: Option<ScriptKind>,
    pub project_root_path: Option<PathBuf>,
}

/// A single in-file replace-range edit, byte-offset based.
#[derive(Debug, Clone)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: PathBuf,
    pub edits: Vec<TextEdit>,
}

#[derive(Debug, Clone, Default)]
pub struct OpenResult {
    pub config_file_name: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalProjectSpec {
    pub name: String,
    pub roots: Vec<PathBuf>,
    pub options: CompilerOptions,
    /// Config file paths this external project's declaration embeds and
    /// thereby adopts (spec §3, external-to-configs map).
    pub embedded_config_files: Vec<PathBuf>,
    /// Roots (a subset of `roots`) the client marked as mixed-content: files
    /// that interleave source with something opaque to the compiler. A
    /// mixed-content script is never watched, per spec §3 (only an external
    /// declaration can produce one; the config-discovery and inferred paths
    /// never do).
    pub mixed_content_roots: HashSet<PathBuf>,
}

struct State {
    scripts: ScriptRegistry,
    presence: ConfigPresenceTable,
    projects: HashMap<ProjectKey, Project>,
    open_files: Vec<PathBuf>,
    pending_updates: HashSet<ProjectKey>,
    pending_inferred_refresh: bool,
    changed_files: Vec<PathBuf>,
    external_to_configs: HashMap<String, Vec<PathBuf>>,
    size_gate: SizeGate,
    safelist: Safelist,
    host_config: HostConfiguration,
    single_inferred_mode: bool,
    next_inferred_id: u64,
    single_inferred_key: Option<ProjectKey>,
    tracked_config_paths: HashMap<PathBuf, Vec<PathBuf>>,
    inferred_root_eligible: HashMap<PathBuf, bool>,
    inferred_compiler_options: CompilerOptions,
}

impl State {
    fn script_tracked_paths(&self, script: &Path) -> Vec<PathBuf> {
        self.tracked_config_paths.get(script).cloned().unwrap_or_default()
    }
}

/// The project-set coordinator.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    host: Arc<dyn Host>,
    config_parser: Arc<dyn ConfigFileParser>,
    typings_installer: Arc<dyn TypingsInstaller>,
    event_sink: Arc<dyn EventSink>,
    scheduler: DebounceScheduler,
    config_file_names: ConfigFileNames,
    state: Mutex<State>,
}

impl Coordinator {
    pub fn new(host: Arc<dyn Host>) -> Coordinator {
        Coordinator::with_collaborators(
            host,
            Arc::new(NullConfigFileParser),
            Arc::new(NullTypingsInstaller),
            Arc::new(NullEventSink),
            ConfigFileNames::default(),
        )
    }

    pub fn with_collaborators(
        host: Arc<dyn Host>,
        config_parser: Arc<dyn ConfigFileParser>,
        typings_installer: Arc<dyn TypingsInstaller>,
        event_sink: Arc<dyn EventSink>,
        config_file_names: ConfigFileNames,
    ) -> Coordinator {
        Coordinator {
            inner: Arc::new(Inner {
                host,
                config_parser,
                typings_installer,
                event_sink,
                scheduler: DebounceScheduler::new(),
                config_file_names,
                state: Mutex::new(State {
                    scripts: ScriptRegistry::new(),
                    presence: ConfigPresenceTable::new(),
                    projects: HashMap::new(),
                    open_files: Vec::new(),
                    pending_updates: HashSet::new(),
                    pending_inferred_refresh: false,
                    changed_files: Vec::new(),
                    external_to_configs: HashMap::new(),
                    size_gate: SizeGate::default(),
                    safelist: Safelist::empty(),
                    host_config: HostConfiguration::default(),
                    single_inferred_mode: false,
                    next_inferred_id: 0,
                    single_inferred_key: None,
                    tracked_config_paths: HashMap::new(),
                    inferred_root_eligible: HashMap::new(),
                    inferred_compiler_options: CompilerOptions::default(),
                }),
            }),
        }
    }

    pub fn set_single_inferred_mode(&self, enabled: bool) {
        self.inner.state.lock().unwrap().single_inferred_mode = enabled;
    }

    /// Blocks until every scheduled debounce task (project graph updates and
    /// the inferred-refresh tail) has drained. For tests only.
    pub fn wait_for_quiescence(&self) {
        self.inner.scheduler.wait_for_all();
    }

    // ---- §4.1 open/close reconciliation -----------------------------------

    pub fn open_client_file(&self, args: OpenFileArgs) -> OpenResult {
        let mut state = self.inner.state.lock().unwrap();
        let path = args.path.clone();
        let was_already_open = state.scripts.get(&path).map(|s| s.open).unwrap_or(false);

        // Step 1: obtain-or-create, load contents, mark open, cancel watcher.
        {
            let kind = args.kind.unwrap_or(ScriptKind::Unknown);
            let script = state.scripts.get_or_create(&path, kind);
            if let Some(contents) = args.contents {
                script.contents = Some(contents);
            } else if script.contents.is_none() {
                script.contents = Some(String::new());
            }
            script.open = true;
            disarm_watch(script);
        }

        // Step 2: an External project already claiming this path short-circuits search.
        let already_external = state
            .scripts
            .get(&path)
            .map(|s| s.containing_projects.iter().any(|k| matches!(k, ProjectKey::External(_))))
            .unwrap_or(false);

        let mut config_file_name = None;
        if !already_external {
            // Step 3: upward config search.
            let (found, eligible) = self.upward_config_search(&mut state, &path, args.project_root_path.as_deref());
            record_eligibility(&mut state, &path, eligible);
            config_file_name = found.clone();

            // Step 4: find-or-create the Configured project.
            if let Some(config_path) = found {
                self.adopt_or_attach_configured(&mut state, &config_path, &path);
            }
        }

        // Step 5: inferred rebalancing.
        self.rebalance_inferred(&mut state);

        // Step 6: append to open-file list, bump open-ref counts.
        if !state.open_files.contains(&path) {
            state.open_files.push(path.clone());
        }
        // A duplicate open of an already-open file must be idempotent (spec
        // §7): only a file's first open bumps a Configured/External project's
        // open-ref count, or a later single close would leave it stuck above
        // zero and the project would never tear down.
        if !was_already_open {
            let containing: Vec<ProjectKey> = state.scripts.get(&path).map(|s| s.containing_projects.iter().cloned().collect()).unwrap_or_default();
            for key in &containing {
                if let Some(project) = state.projects.get_mut(key) {
                    if !project.is_inferred() {
                        project.inc_open_ref();
                    }
                }
            }
        }

        // Step 7: GC closed scripts with empty membership, deferred from prior closes.
        state.scripts.sweep();

        OpenResult { config_file_name }
    }

    pub fn close_client_file(&self, path: &Path) {
        let mut state = self.inner.state.lock().unwrap();
        if !state.scripts.contains(path) {
            // Protocol misuse on an unknown file is a no-op (spec §4.8/§7).
            return;
        }

        let containing: Vec<ProjectKey> = {
            let script = state.scripts.get_mut(path).unwrap();
            script.open = false;
            script.contents = None;
            script.containing_projects.iter().cloned().collect()
        };

        {
            let host = Arc::clone(&self.inner.host);
            let coordinator = self.clone();
            let watched_path = path.to_owned();
            let script = state.scripts.get_mut(path).unwrap();
            arm_watch(host.as_ref(), script, move |changed, kind| {
                coordinator.on_filesystem_event(changed, kind);
            });
            let _ = watched_path;
        }

        state.open_files.retain(|p| p != path);

        for key in containing {
            let mut remove_edge = false;
            let should_remove = match state.projects.get_mut(&key) {
                Some(project) => {
                    if project.is_inferred() {
                        // Inferred membership is single-purpose: the root is
                        // always detached from the project on close, whether
                        // or not the project itself survives.
                        let was_sole_root = project.header().roots.len() == 1;
                        project.header_mut().remove_root(&path.to_owned());
                        remove_edge = true;
                        was_sole_root || project.header().roots.is_empty()
                    } else {
                        // Configured/External: only decrement open-ref. A
                        // surviving project (ref still > 0) keeps this closed
                        // file as a known root, so the edge stays intact and
                        // the script stays watched rather than swept.
                        let torn_down = project.dec_open_ref();
                        remove_edge = torn_down;
                        torn_down
                    }
                }
                None => false,
            };
            if remove_edge {
                if let Some(script) = state.scripts.get_mut(path) {
                    script.containing_projects.remove(&key);
                }
            }
            if should_remove {
                self.teardown_project(&mut state, &key);
            }
        }

        // Untrack this (now-closed) script from every config path its search visited.
        let tracked = state.script_tracked_paths(path);
        for config_path in &tracked {
            let drop_watcher = state.presence.untrack(config_path, path);
            if drop_watcher {
                if let Some(entry) = state.presence.get_mut(config_path) {
                    entry.watcher = None;
                }
            }
        }
        state.tracked_config_paths.remove(path);
        state.inferred_root_eligible.remove(path);

        self.rebalance_inferred(&mut state);
        state.scripts.sweep();
    }

    // ---- §4.2 change reconciliation ---------------------------------------

    pub fn apply_changes_in_open_files(&self, opens: Vec<OpenFileArgs>, edits: Vec<FileChange>, closes: Vec<PathBuf>) {
        let had_opens_or_closes = !opens.is_empty() || !closes.is_empty();

        for open in opens {
            self.open_client_file(open);
        }

        for change in edits {
            self.apply_single_file_edits(&change.path, change.edits);
        }

        for close in &closes {
            self.close_client_file(close);
        }

        if had_opens_or_closes {
            self.flush_all_pending_immediately();
        }
    }

    fn apply_single_file_edits(&self, path: &Path, mut edits: Vec<TextEdit>) {
        if edits.is_empty() {
            return;
        }
        // Reverse offset order so earlier edits' coordinates stay valid (spec §4.2/§5).
        edits.sort_by(|a, b| b.start.cmp(&a.start));

        let mut state = self.inner.state.lock().unwrap();
        let containing: Vec<ProjectKey> = {
            let script = state
                .scripts
                .get_mut(path)
                .unwrap_or_else(|| panic!("fatal: edit applied to a file the client never opened: {:?}", path));
            assert!(script.open, "fatal: edit applied to a file the client never opened: {:?}", path);

            let mut contents = script.contents.take().unwrap_or_default();
            for edit in &edits {
                let start = edit.start.min(contents.len());
                let end = edit.end.min(contents.len()).max(start);
                contents.replace_range(start..end, &edit.text);
            }
            script.contents = Some(contents);
            script.containing_projects.iter().cloned().collect()
        };

        state.changed_files.push(path.to_owned());
        for key in containing {
            self.mark_project_dirty(&mut state, &key);
        }
    }

    /// Entry point for a filesystem watch callback on a known script path.
    fn on_filesystem_event(&self, path: &Path, kind: WatchEventKind) {
        let mut state = self.inner.state.lock().unwrap();

        if state.presence.get(path).is_some() || self.is_probed_config_name(path) {
            self.on_config_file_event(&mut state, path, kind);
            return;
        }

        if !state.scripts.contains(path) {
            // Unknown path: logged and ignored (spec §4.8).
            debug!("watch event for unknown path {:?}, ignoring", path);
            return;
        }

        match kind {
            WatchEventKind::Deleted => {
                let containing: Vec<ProjectKey> = state.scripts.get(path).map(|s| s.containing_projects.iter().cloned().collect()).unwrap_or_default();
                for key in &containing {
                    if let Some(project) = state.projects.get_mut(key) {
                        project.header_mut().remove_root(&path.to_owned());
                    }
                    self.mark_project_dirty(&mut state, key);
                }
                if let Some(script) = state.scripts.get_mut(path) {
                    script.watcher = None;
                }
                state.scripts.collect_garbage(path);
                state.scripts.sweep();
            }
            WatchEventKind::Changed => {
                let (is_open, is_orphan) = state
                    .scripts
                    .get(path)
                    .map(|s| (s.open, s.containing_projects.is_empty()))
                    .unwrap_or((false, true));
                if is_open {
                    // Client owns content; ignore.
                } else if is_orphan {
                    state.scripts.collect_garbage(path);
                } else {
                    let host = Arc::clone(&self.inner.host);
                    if let Ok(text) = host.read_file(path) {
                        if let Some(script) = state.scripts.get_mut(path) {
                            script.contents = Some(text);
                        }
                    }
                    let containing: Vec<ProjectKey> = state.scripts.get(path).map(|s| s.containing_projects.iter().cloned().collect()).unwrap_or_default();
                    for key in containing {
                        self.mark_project_dirty(&mut state, &key);
                    }
                }
            }
            WatchEventKind::Created => {
                // A closed, known script reappearing; treat like a change.
                self.on_filesystem_event_created_or_changed(&mut state, path);
            }
        }
    }

    fn on_filesystem_event_created_or_changed(&self, state: &mut State, path: &Path) {
        let containing: Vec<ProjectKey> = state.scripts.get(path).map(|s| s.containing_projects.iter().cloned().collect()).unwrap_or_default();
        for key in containing {
            self.mark_project_dirty(state, &key);
        }
    }

    fn is_probed_config_name(&self, path: &Path) -> bool {
        path.file_name().map(|n| n == self.inner.config_file_names.primary.as_str() || n == self.inner.config_file_names.secondary.as_str()).unwrap_or(false)
    }

    // ---- §4.3 config-file watcher state machine ----------------------------

    /// Walks from `start`'s directory toward the filesystem root, bounded
    /// above by `bound` if given, probing the primary then secondary config
    /// filename at each level. Returns the first existing path, if any, and
    /// whether this script is eligible to have its tracked paths armed as
    /// inferred-root watches (false only for the unbounded, nothing-found,
    /// walked-to-the-true-root case -- spec scenario S1).
    fn upward_config_search(&self, state: &mut State, start: &Path, bound: Option<&Path>) -> (Option<PathBuf>, bool) {
        let host = Arc::clone(&self.inner.host);
        let mut dir = start.parent().map(|p| p.to_owned()).unwrap_or_else(|| PathBuf::from("/"));
        let mut found = None;
        let mut reached_true_root = false;

        loop {
            for name in [self.inner.config_file_names.primary.clone(), self.inner.config_file_names.secondary.clone()] {
                let candidate = dir.join(&name);
                let exists = state.presence.probe_and_track(|| host.file_exists(&candidate), &candidate, start, false);
                state.tracked_config_paths.entry(start.to_owned()).or_default().push(candidate.clone());
                if exists && found.is_none() {
                    found = Some(candidate);
                }
            }
            if found.is_some() {
                break;
            }
            if let Some(bound) = bound {
                if dir == bound {
                    break;
                }
            }
            match dir.parent() {
                Some(parent) if parent != dir => dir = parent.to_owned(),
                _ => {
                    reached_true_root = true;
                    break;
                }
            }
        }

        let eligible = !(bound.is_none() && found.is_none() && reached_true_root);
        (found, eligible)
    }

    /// Attaches `script_path` to the Configured project at `config_path`,
    /// creating it on first reference. An explicit `files` list in the
    /// parsed config is an allowlist: a script whose upward search merely
    /// crossed this config but isn't named in `files` is *not* claimed, and
    /// is left to fall through to inferred-project rebalancing instead
    /// (spec scenario S3). An empty `files` list claims every script that
    /// found this config, matching the include-everything default.
    fn adopt_or_attach_configured(&self, state: &mut State, config_path: &Path, script_path: &Path) -> bool {
        let key = ProjectKey::Configured(config_path.to_owned());
        if !state.projects.contains_key(&key) {
            self.create_configured_project(state, config_path, script_path);
        }
        let claimed = match state.projects.get(&key) {
            Some(Project::Configured(p)) => p.specs.files.is_empty() || p.specs.files.iter().any(|f| f == script_path),
            _ => true,
        };
        if !claimed {
            return false;
        }
        if let Some(project) = state.projects.get_mut(&key) {
            project.header_mut().add_root(script_path.to_owned());
        }
        if let Some(script) = state.scripts.get_mut(script_path) {
            script.containing_projects.insert(key);
        }
        true
    }

    fn create_configured_project(&self, state: &mut State, config_path: &Path, trigger_file: &Path) {
        let host = Arc::clone(&self.inner.host);
        let text = host.read_file(config_path).unwrap_or_default();
        let parsed = self.inner.config_parser.parse(config_path, &text);

        let key = ProjectKey::Configured(config_path.to_owned());
        let mut project = Project::new_configured(config_path.to_owned());
        if let Project::Configured(ref mut p) = project {
            p.header.options = parsed.compiler_options.clone();
            p.header.compile_on_save = parsed.compile_on_save;
            p.specs.files = parsed.file_names.clone();
            p.specs.include = Vec::new();
            p.specs.exclude = Vec::new();
            for root in &parsed.file_names {
                p.header.add_root(root.clone());
            }
            for msg in &parsed.diagnostics {
                p.header.diagnostics.push(msg.clone());
            }
            if parsed.file_names.is_empty() && !parsed.has_include {
                p.header.diagnostics.push("no files matched".to_string());
            }
        }

        self.apply_size_gate(&mut project, state);
        state.projects.insert(key.clone(), project);

        state.presence.adopt(config_path);
        let coordinator = self.clone();
        let config_path_owned = config_path.to_owned();
        if let Some(entry) = state.presence.get_mut(config_path) {
            entry.watcher = Some(self.inner.host.watch_file(
                config_path,
                Box::new(move |changed, kind| coordinator.on_config_file_event_external(changed.to_owned(), kind, config_path_owned.clone())),
            ));
        }

        self.arm_project_watchers_if_enabled(state, &key);

        self.inner.event_sink.emit(Event::ConfigFileDiagnostics(ConfigFileDiagnostics {
            trigger_file: trigger_file.to_owned(),
            config_file_name: config_path.to_owned(),
            diagnostics: state.projects.get(&key).map(|p| p.header().diagnostics.messages.clone()).unwrap_or_default(),
        }));
    }

    fn on_config_file_event_external(&self, _changed: PathBuf, kind: WatchEventKind, config_path: PathBuf) {
        let mut state = self.inner.state.lock().unwrap();
        self.on_config_file_event(&mut state, &config_path, kind);
    }

    fn on_config_file_event(&self, state: &mut State, config_path: &Path, kind: WatchEventKind) {
        let presence_state = state.presence.get(config_path).map(|e| e.state());
        match presence_state {
            Some(PresenceState::GhostWatched) => {
                let trackers: Vec<PathBuf> = state.presence.get(config_path).map(|e| e.tracking.keys().cloned().collect()).unwrap_or_default();
                self.reload_trackers(state, &trackers);
            }
            Some(PresenceState::Adopted) => {
                let key = ProjectKey::Configured(config_path.to_owned());
                match kind {
                    WatchEventKind::Deleted => {
                        let trackers: Vec<PathBuf> = state.projects.get(&key).map(|p| p.header().roots.clone()).unwrap_or_default();
                        self.teardown_project(state, &key);
                        state.presence.unadopt(config_path);
                        self.reload_trackers(state, &trackers);
                    }
                    WatchEventKind::Created | WatchEventKind::Changed => {
                        if let Some(Project::Configured(p)) = state.projects.get_mut(&key) {
                            p.pending_reload = true;
                        }
                        self.mark_project_dirty(state, &key);
                    }
                }
            }
            _ => {
                debug!("stale watch event for config path {:?}, ignoring", config_path);
            }
        }
    }

    /// Re-runs the upward search for every open file in `trackers`, since the
    /// set of existing config files has changed and their resolution may now
    /// differ (spec §4.3 watcher callback semantics).
    fn reload_trackers(&self, state: &mut State, trackers: &[PathBuf]) {
        for tracker in trackers {
            if !state.scripts.get(tracker).map(|s| s.open).unwrap_or(false) {
                continue;
            }
            if let Some(script) = state.scripts.get_mut(tracker) {
                let containing: Vec<ProjectKey> = script.containing_projects.drain().collect();
                for key in containing {
                    let should_remove = match state.projects.get_mut(&key) {
                        Some(project) => {
                            if project.is_inferred() {
                                project.header_mut().remove_root(&tracker.to_owned());
                                project.header().roots.is_empty()
                            } else {
                                project.dec_open_ref()
                            }
                        }
                        None => false,
                    };
                    if should_remove {
                        self.teardown_project(state, &key);
                    }
                }
            }
            let (found, eligible) = self.upward_config_search(state, tracker, None);
            record_eligibility(state, tracker, eligible);
            if let Some(config_path) = found {
                let claimed = self.adopt_or_attach_configured(state, &config_path, tracker);
                if claimed {
                    if let Some(project) = state.projects.get_mut(&ProjectKey::Configured(config_path)) {
                        project.inc_open_ref();
                    }
                }
            }
        }
        self.rebalance_inferred(state);
        state.scripts.sweep();
    }

    // ---- §4.5 size gate -----------------------------------------------------

    fn apply_size_gate(&self, project: &mut Project, state: &mut State) {
        let key = project.key();
        let host = Arc::clone(&self.inner.host);
        let roots = project.header().roots.clone();
        let candidate_owned: Vec<(PathBuf, ScriptKind, u64)> = roots
            .iter()
            .map(|r| {
                let kind = classify_extension(r, &state.host_config);
                let size = host.get_file_size(r).unwrap_or(0);
                (r.clone(), kind, size)
            })
            .collect();
        let candidates: Vec<CandidateFile<'_>> =
            candidate_owned.iter().map(|(p, k, s)| CandidateFile { path: p.as_path(), kind: *k, size_bytes: *s }).collect();

        match state.size_gate.evaluate(&key, &candidates) {
            GateDecision::Fits { non_source_bytes } => {
                state.size_gate.commit(key, non_source_bytes);
                project.header_mut().language_service_enabled = true;
            }
            GateDecision::Exceeds => {
                project.header_mut().language_service_enabled = false;
                project.header_mut().watchers.wildcard_directories.clear();
                project.header_mut().watchers.type_roots.clear();
            }
        }

        self.inner.event_sink.emit(Event::LanguageServiceState { project: project.key(), enabled: project.header().language_service_enabled });
    }

    fn arm_project_watchers_if_enabled(&self, state: &mut State, key: &ProjectKey) {
        let enabled = state.projects.get(key).map(|p| p.header().language_service_enabled).unwrap_or(false);
        if !enabled {
            return;
        }
        // Wildcard directory / type-root watchers: arm one per root's parent
        // directory as a stand-in for the compiler-supplied wildcard map,
        // since that map is owned by the out-of-scope config parser.
        let roots = state.projects.get(key).map(|p| p.header().roots.clone()).unwrap_or_default();
        let mut handles = Vec::new();
        for root in &roots {
            if let Some(dir) = root.parent() {
                let coordinator = self.clone();
                let key_owned = key.clone();
                let handle = self.inner.host.watch_directory(
                    dir,
                    false,
                    Box::new(move |changed, kind| coordinator.on_wildcard_directory_event(key_owned.clone(), changed.to_owned(), kind)),
                );
                handles.push(handle);
            }
        }
        if let Some(project) = state.projects.get_mut(key) {
            project.header_mut().watchers.wildcard_directories = handles;
        }
    }

    fn on_wildcard_directory_event(&self, key: ProjectKey, _changed: PathBuf, _kind: WatchEventKind) {
        let mut state = self.inner.state.lock().unwrap();
        self.mark_project_dirty(&mut state, &key);
    }

    // ---- §4.6 inferred rebalancing ------------------------------------------

    fn rebalance_inferred(&self, state: &mut State) {
        let orphans: Vec<PathBuf> =
            state.open_files.iter().filter(|p| state.scripts.get(p).map(|s| s.containing_projects.is_empty()).unwrap_or(false)).cloned().collect();

        for orphan in orphans {
            let key = if state.single_inferred_mode {
                match &state.single_inferred_key {
                    Some(k) => k.clone(),
                    None => {
                        let id = state.next_inferred_id;
                        state.next_inferred_id += 1;
                        let key = ProjectKey::Inferred(id);
                        let mut project = Project::new_inferred(id);
                        project.header_mut().options = state.inferred_compiler_options.clone();
                        state.projects.insert(key.clone(), project);
                        state.single_inferred_key = Some(key.clone());
                        key
                    }
                }
            } else {
                let id = state.next_inferred_id;
                state.next_inferred_id += 1;
                let key = ProjectKey::Inferred(id);
                let mut project = Project::new_inferred(id);
                project.header_mut().options = state.inferred_compiler_options.clone();
                state.projects.insert(key.clone(), project);
                key
            };

            if let Some(project) = state.projects.get_mut(&key) {
                project.header_mut().add_root(orphan.clone());
                project.header_mut().graph.rebuild();
                project.header_mut().dirty = false;
            }
            if let Some(script) = state.scripts.get_mut(&orphan) {
                script.containing_projects.insert(key.clone());
            }

            let eligible = state.inferred_root_eligible.get(&orphan).copied().unwrap_or(false);
            if eligible {
                let tracked = state.script_tracked_paths(&orphan);
                for config_path in tracked {
                    state.presence.mark_inferred_root(&config_path, &orphan);
                    let needs_watcher = state.presence.get(&config_path).map(|e| e.watcher.is_none() && e.has_root_tracker()).unwrap_or(false);
                    if needs_watcher {
                        let coordinator = self.clone();
                        let config_path_owned = config_path.clone();
                        let handle = self
                            .inner
                            .host
                            .watch_file(&config_path, Box::new(move |changed, kind| coordinator.on_config_file_event_external(changed.to_owned(), kind, config_path_owned.clone())));
                        if let Some(entry) = state.presence.get_mut(&config_path) {
                            entry.watcher = Some(handle);
                        }
                    }
                }
            }
            self.inner.event_sink.emit(Event::ContextChanged { project: key, file: orphan });
        }

        // Drop redundant roots: any Inferred root that now belongs to another project too.
        let inferred_keys: Vec<ProjectKey> = state.projects.iter().filter(|(_, p)| p.is_inferred()).map(|(k, _)| k.clone()).collect();
        for key in inferred_keys {
            let redundant_roots: Vec<PathBuf> = state
                .projects
                .get(&key)
                .map(|p| p.header().roots.iter().filter(|r| state.scripts.get(r).map(|s| s.containing_projects.len() > 1).unwrap_or(false)).cloned().collect())
                .unwrap_or_default();
            for root in redundant_roots {
                if let Some(project) = state.projects.get_mut(&key) {
                    project.header_mut().remove_root(&root);
                }
                if let Some(script) = state.scripts.get_mut(&root) {
                    script.containing_projects.remove(&key);
                }
            }
            let now_rootless = state.projects.get(&key).map(|p| p.header().roots.is_empty()).unwrap_or(false);
            if now_rootless {
                self.teardown_project(state, &key);
            }
        }
    }

    // ---- debounce plumbing ---------------------------------------------------

    fn mark_project_dirty(&self, state: &mut State, key: &ProjectKey) {
        if let Some(project) = state.projects.get_mut(key) {
            project.header_mut().dirty = true;
        } else {
            return;
        }
        state.pending_updates.insert(key.clone());
        state.pending_inferred_refresh = true;

        let coordinator = self.clone();
        let key_owned = key.clone();
        self.inner.scheduler.schedule_default(&key.display_name(), move || coordinator.flush_project_update(key_owned));

        let coordinator_tail = self.clone();
        self.inner.scheduler.schedule_default(REFRESH_INFERRED_PROJECTS, move || coordinator_tail.run_refresh_inferred_tail());
    }

    fn flush_project_update(&self, key: ProjectKey) {
        let mut state = self.inner.state.lock().unwrap();
        self.rebuild_project_graph(&mut state, &key);
    }

    fn rebuild_project_graph(&self, state: &mut State, key: &ProjectKey) {
        let needs_reload = matches!(state.projects.get(key), Some(Project::Configured(p)) if p.pending_reload);
        if needs_reload {
            if let ProjectKey::Configured(path) = key {
                let path = path.clone();
                self.reload_configured_project(state, &path);
            }
        }

        if let Some(project) = state.projects.get_mut(key) {
            if project.header().dirty {
                project.header_mut().graph.rebuild();
                project.header_mut().dirty = false;
            }
        }
        state.pending_updates.remove(key);

        let roots = state.projects.get(key).map(|p| p.header().roots.clone()).unwrap_or_default();
        for root in roots {
            self.inner.event_sink.emit(Event::ContextChanged { project: key.clone(), file: root });
        }
    }

    fn reload_configured_project(&self, state: &mut State, config_path: &Path) {
        let host = Arc::clone(&self.inner.host);
        let text = host.read_file(config_path).unwrap_or_default();
        let parsed = self.inner.config_parser.parse(config_path, &text);
        let key = ProjectKey::Configured(config_path.to_owned());

        if let Some(Project::Configured(p)) = state.projects.get_mut(&key) {
            p.pending_reload = false;
            p.header.options = parsed.compiler_options.clone();
            p.header.compile_on_save = parsed.compile_on_save;
            p.specs.files = parsed.file_names.clone();
            p.header.roots.clear();
            for root in &parsed.file_names {
                p.header.add_root(root.clone());
            }
            p.header.diagnostics = crate::project::ProjectDiagnostics::default();
            for msg in &parsed.diagnostics {
                p.header.diagnostics.push(msg.clone());
            }
            if parsed.file_names.is_empty() && !parsed.has_include {
                p.header.diagnostics.push("no files matched".to_string());
            }
        }

        if let Some(mut project) = state.projects.remove(&key) {
            self.apply_size_gate(&mut project, state);
            state.projects.insert(key.clone(), project);
        }
        self.arm_project_watchers_if_enabled(state, &key);

        self.inner.event_sink.emit(Event::ConfigFileDiagnostics(ConfigFileDiagnostics {
            trigger_file: config_path.to_owned(),
            config_file_name: config_path.to_owned(),
            diagnostics: state.projects.get(&key).map(|p| p.header().diagnostics.messages.clone()).unwrap_or_default(),
        }));
    }

    fn run_refresh_inferred_tail(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if !state.pending_updates.is_empty() {
            drop(state);
            let coordinator = self.clone();
            self.inner.scheduler.schedule_default(REFRESH_INFERRED_PROJECTS, move || coordinator.run_refresh_inferred_tail());
            return;
        }
        state.pending_inferred_refresh = false;
        self.rebalance_inferred(&mut state);
    }

    /// Synchronously drains every pending per-project update and then the
    /// inferred refresh, bypassing the debounce delay. Used after a batch
    /// that contained opens or closes (spec §4.2).
    fn flush_all_pending_immediately(&self) {
        let mut state = self.inner.state.lock().unwrap();
        let pending: Vec<ProjectKey> = state.pending_updates.iter().cloned().collect();
        for key in pending {
            self.rebuild_project_graph(&mut state, &key);
        }
        state.pending_inferred_refresh = false;
        self.rebalance_inferred(&mut state);
    }

    fn teardown_project(&self, state: &mut State, key: &ProjectKey) {
        if let Some(project) = state.projects.remove(key) {
            state.size_gate.remove_project(key);
            if let ProjectKey::Configured(path) = key {
                state.presence.unadopt(path);
            }
            if matches!(state.single_inferred_key.as_ref(), Some(k) if k == key) {
                state.single_inferred_key = None;
            }
            self.inner.typings_installer.invalidate(&key.display_name());
            drop(project);
        }
        state.pending_updates.remove(key);
    }

    // ---- §6 public API: external projects -----------------------------------

    pub fn open_external_project(&self, spec: ExternalProjectSpec) {
        let mut state = self.inner.state.lock().unwrap();
        self.open_external_project_locked(&mut state, spec);
    }

    fn open_external_project_locked(&self, state: &mut State, spec: ExternalProjectSpec) {
        let key = ProjectKey::External(spec.name.clone());

        let roots = if state.safelist.is_empty() {
            spec.roots.clone()
        } else {
            let outcome = state.safelist.apply(&spec.roots);
            if !outcome.injected_typings.is_empty() {
                self.inner.typings_installer.update_typings_for_project(
                    &spec.name,
                    &spec.options,
                    &Default::default(),
                    &[],
                    &outcome.injected_typings,
                );
            }
            outcome.surviving_roots
        };

        let mut project = Project::new_external(spec.name.clone());
        project.header_mut().options = spec.options.clone();
        for root in &roots {
            project.header_mut().add_root(root.clone());
        }
        self.apply_size_gate(&mut project, state);
        state.projects.insert(key.clone(), project);

        for script_path in &roots {
            let kind = if spec.mixed_content_roots.contains(script_path) { ScriptKind::ExternalMixed } else { ScriptKind::Unknown };
            let script = state.scripts.get_or_create(script_path, kind);
            script.containing_projects.insert(key.clone());
        }

        state.external_to_configs.insert(spec.name.clone(), spec.embedded_config_files.clone());
        for config_path in &spec.embedded_config_files {
            if !state.projects.contains_key(&ProjectKey::Configured(config_path.clone())) {
                self.create_configured_project(state, config_path, config_path);
            }
        }

        self.rebalance_inferred(state);

        self.inner.event_sink.emit(Event::ProjectInfoTelemetry(self.scrub_telemetry(state, &key)));
    }

    /// Atomic delta: any external project absent from `specs` is closed.
    pub fn open_external_projects(&self, specs: Vec<ExternalProjectSpec>) {
        let mut state = self.inner.state.lock().unwrap();
        let incoming: HashSet<String> = specs.iter().map(|s| s.name.clone()).collect();
        let existing: Vec<String> =
            state.projects.keys().filter_map(|k| if let ProjectKey::External(name) = k { Some(name.clone()) } else { None }).collect();
        for name in existing {
            if !incoming.contains(&name) {
                self.close_external_project_locked(&mut state, &name);
            }
        }
        for spec in specs {
            self.open_external_project_locked(&mut state, spec);
        }
    }

    pub fn close_external_project(&self, name: &str) {
        let mut state = self.inner.state.lock().unwrap();
        self.close_external_project_locked(&mut state, name);
    }

    fn close_external_project_locked(&self, state: &mut State, name: &str) {
        let key = ProjectKey::External(name.to_owned());
        let roots = state.projects.get(&key).map(|p| p.header().roots.clone()).unwrap_or_default();
        for root in &roots {
            if let Some(script) = state.scripts.get_mut(root) {
                script.containing_projects.remove(&key);
            }
        }
        self.teardown_project(state, &key);
        if let Some(configs) = state.external_to_configs.remove(name) {
            for config_path in configs {
                let config_key = ProjectKey::Configured(config_path.clone());
                let still_referenced = state.external_to_configs.values().any(|v| v.contains(&config_path));
                if !still_referenced {
                    self.teardown_project(state, &config_key);
                }
            }
        }
        self.rebalance_inferred(state);
        state.scripts.sweep();
    }

    fn scrub_telemetry(&self, state: &State, key: &ProjectKey) -> ProjectInfoTelemetry {
        let project = state.projects.get(key);
        let roots = project.map(|p| p.header().roots.clone()).unwrap_or_default();
        let mut extension_counts: HashMap<String, u32> = HashMap::new();
        for root in &roots {
            let ext = root.extension().and_then(|e| e.to_str()).unwrap_or("").to_owned();
            *extension_counts.entry(ext).or_insert(0) += 1;
        }
        let enabled = project.map(|p| p.header().language_service_enabled).unwrap_or(false);
        ProjectInfoTelemetry {
            hashed_project_id: self.inner.host.create_hash(&key.display_name()),
            project_type: project.map(|p| p.taxonomic_kind()).unwrap_or("unknown"),
            extension_counts: extension_counts.into_iter().collect(),
            enum_options: Vec::new(),
            language_service_enabled: enabled,
        }
    }

    // ---- §6 public API: misc ------------------------------------------------

    pub fn set_compiler_options_for_inferred_projects(&self, options: CompilerOptions) {
        let mut state = self.inner.state.lock().unwrap();
        state.inferred_compiler_options = options.clone();
        let inferred_keys: Vec<ProjectKey> = state.projects.iter().filter(|(_, p)| p.is_inferred()).map(|(k, _)| k.clone()).collect();
        for key in &inferred_keys {
            if let Some(project) = state.projects.get_mut(key) {
                project.header_mut().options = options.clone();
            }
            self.mark_project_dirty(&mut state, key);
        }
    }

    pub fn set_host_configuration(&self, update: HostConfigurationUpdate) {
        let mut state = self.inner.state.lock().unwrap();
        state.host_config.apply(update);
    }

    pub fn load_safelist(&self, path: &Path) -> Result<(), serde_json::Error> {
        let text = match self.inner.host.read_file(path) {
            Ok(text) => text,
            Err(err) => {
                // Filesystem errors degrade rather than raise (spec §4.8/§7):
                // log and leave the safelist as it was.
                warn!("failed to read safelist file {:?}: {}", path, err);
                return Ok(());
            }
        };
        let safelist = Safelist::parse(&text)?;
        self.inner.state.lock().unwrap().safelist = safelist;
        Ok(())
    }

    pub fn reset_safelist(&self) {
        self.inner.state.lock().unwrap().safelist = Safelist::empty();
    }

    pub fn find_project(&self, name: &str) -> Result<ProjectSummary, CoordinatorError> {
        let state = self.inner.state.lock().unwrap();
        state
            .projects
            .get(&ProjectKey::External(name.to_owned()))
            .or_else(|| {
                let config_key = ProjectKey::Configured(PathBuf::from(name));
                state.projects.get(&config_key)
            })
            .map(|p| summarize(p))
            .ok_or_else(|| CoordinatorError::UnknownProject(name.to_owned()))
    }

    pub fn get_default_project_for_file(&self, path: &Path, refresh: bool) -> Option<ProjectKey> {
        if refresh {
            let mut state = self.inner.state.lock().unwrap();
            self.rebalance_inferred(&mut state);
        }
        let state = self.inner.state.lock().unwrap();
        let containing = state.scripts.get(path)?.containing_projects.clone();
        containing.into_iter().max_by_key(|k| k.priority())
    }

    pub fn get_script_info(&self, path: &Path) -> Result<ScriptInfoSummary, CoordinatorError> {
        let state = self.inner.state.lock().unwrap();
        let script = state.scripts.get(path).ok_or_else(|| CoordinatorError::UnknownScript(path.to_owned()))?;
        Ok(ScriptInfoSummary {
            path: script.normalized_path.clone(),
            open: script.open,
            kind: script.kind,
            containing_projects: script.containing_projects.iter().cloned().collect(),
        })
    }

    /// Diffs the coordinator's current projects against `known_versions`
    /// (name -> last-known graph version) and returns which changed.
    pub fn synchronize_project_list(&self, known_versions: &HashMap<String, u64>) -> Vec<String> {
        let state = self.inner.state.lock().unwrap();
        state
            .projects
            .iter()
            .filter_map(|(key, project)| {
                let name = key.display_name();
                let current_version = project.header().graph.version;
                match known_versions.get(&name) {
                    Some(&known) if known == current_version => None,
                    _ => Some(name),
                }
            })
            .collect()
    }

    /// Full reconciliation pass: re-probe config presence for every open
    /// file's search path, re-apply the size gate, and rebalance inferred
    /// projects. Heavier than a debounced update; per SPEC_FULL §AMBIENT
    /// SUPPLEMENTS this is the semantics the public `reloadProjects` gets.
    pub fn reload_projects(&self) {
        let mut state = self.inner.state.lock().unwrap();
        let configured_keys: Vec<PathBuf> =
            state.projects.keys().filter_map(|k| if let ProjectKey::Configured(p) = k { Some(p.clone()) } else { None }).collect();
        for path in configured_keys {
            if let Some(Project::Configured(p)) = state.projects.get_mut(&ProjectKey::Configured(path.clone())) {
                p.pending_reload = true;
            }
            self.rebuild_project_graph(&mut state, &ProjectKey::Configured(path));
        }
        let external_keys: Vec<ProjectKey> = state.projects.keys().filter(|k| matches!(k, ProjectKey::External(_))).cloned().collect();
        for key in external_keys {
            if let Some(mut project) = state.projects.remove(&key) {
                self.apply_size_gate(&mut project, &mut state);
                state.projects.insert(key, project);
            }
        }
        self.rebalance_inferred(&mut state);
    }

    #[cfg(test)]
    pub(crate) fn debug_project_count(&self) -> usize {
        self.inner.state.lock().unwrap().projects.len()
    }

    #[cfg(test)]
    pub(crate) fn debug_has_project(&self, key: &ProjectKey) -> bool {
        self.inner.state.lock().unwrap().projects.contains_key(key)
    }

    #[cfg(test)]
    pub(crate) fn debug_presence_state(&self, path: &Path) -> Option<PresenceState> {
        self.inner.state.lock().unwrap().presence.get(path).map(|e| e.state())
    }

    #[cfg(test)]
    pub(crate) fn debug_project_roots(&self, key: &ProjectKey) -> Vec<PathBuf> {
        self.inner.state.lock().unwrap().projects.get(key).map(|p| p.header().roots.clone()).unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn debug_open_ref_count(&self, key: &ProjectKey) -> u32 {
        let state = self.inner.state.lock().unwrap();
        match state.projects.get(key) {
            Some(Project::External(p)) => p.open_ref_count,
            Some(Project::Configured(p)) => p.open_ref_count,
            _ => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn debug_language_service_enabled(&self, key: &ProjectKey) -> Option<bool> {
        self.inner.state.lock().unwrap().projects.get(key).map(|p| p.header().language_service_enabled)
    }

    #[cfg(test)]
    pub(crate) fn debug_graph_version(&self, key: &ProjectKey) -> u64 {
        self.inner.state.lock().unwrap().projects.get(key).map(|p| p.header().graph.version).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn debug_presence_exists(&self, path: &Path) -> bool {
        self.inner.state.lock().unwrap().presence.get(path).is_some()
    }

    /// Count of armed wildcard-directory and type-root watchers on a project,
    /// in that order. Torn down when the size gate disables the language
    /// service (spec §4.5 step 4).
    #[cfg(test)]
    pub(crate) fn debug_project_watcher_counts(&self, key: &ProjectKey) -> (usize, usize) {
        self.inner
            .state
            .lock()
            .unwrap()
            .projects
            .get(key)
            .map(|p| (p.header().watchers.wildcard_directories.len(), p.header().watchers.type_roots.len()))
            .unwrap_or((0, 0))
    }

    /// Asserts the watcher invariant (spec §8 Property 3: watcher-present iff
    /// `!open && !mixed && known`) for every script the registry currently
    /// tracks.
    #[cfg(test)]
    pub(crate) fn debug_assert_watcher_invariants(&self) {
        let state = self.inner.state.lock().unwrap();
        for script in state.scripts.iter() {
            script.assert_watcher_invariant();
        }
    }
}

/// Sticky-OR: once a script's upward search has found a config anywhere in
/// its ancestry, it stays eligible for inferred-root watching even if a
/// later re-search (e.g. after that config is deleted) walks all the way to
/// the filesystem root without finding anything. Only a script that has
/// *never* resolved to a config stays ineligible (spec scenario S1).
fn record_eligibility(state: &mut State, script: &Path, eligible_this_search: bool) {
    let was_eligible = state.inferred_root_eligible.get(script).copied().unwrap_or(false);
    state.inferred_root_eligible.insert(script.to_owned(), eligible_this_search || was_eligible);
}

fn classify_extension(path: &Path, host_config: &HostConfiguration) -> ScriptKind {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if let Some(kind) = host_config.script_kind_for_extension(extension) {
        return kind;
    }
    match extension {
        "ts" => ScriptKind::Ts,
        "tsx" => ScriptKind::Tsx,
        "jsx" => ScriptKind::Jsx,
        "js" => ScriptKind::Js,
        _ => ScriptKind::Unknown,
    }
}

pub struct ProjectSummary {
    pub key: ProjectKey,
    pub root_count: usize,
    pub language_service_enabled: bool,
}

fn summarize(project: &Project) -> ProjectSummary {
    ProjectSummary { key: project.key(), root_count: project.header().roots.len(), language_service_enabled: project.header().language_service_enabled }
}

pub struct ScriptInfoSummary {
    pub path: PathBuf,
    pub open: bool,
    pub kind: ScriptKind,
    pub containing_projects: Vec<ProjectKey>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_presence::PresenceState;
    use crate::host::MockHost;

    fn coordinator_with(host: Arc<MockHost>) -> Coordinator {
        Coordinator::new(host)
    }

    /// A config parser that honors an explicit `"files"` allowlist, so tests
    /// can exercise the claim-vs-fall-through behavior of
    /// `adopt_or_attach_configured` (spec scenario S3) without needing the
    /// real, out-of-scope compiler front-end.
    struct FilesListConfigParser;

    impl crate::collaborators::ConfigFileParser for FilesListConfigParser {
        fn parse(&self, config_path: &Path, text: &str) -> crate::collaborators::ParsedConfigFile {
            let mut result = crate::collaborators::ParsedConfigFile::default();
            let dir = config_path.parent().unwrap_or_else(|| Path::new("/"));
            if let Some(files_start) = text.find("\"files\"") {
                if let (Some(bracket_start), Some(bracket_end)) =
                    (text[files_start..].find('['), text[files_start..].find(']'))
                {
                    let list = &text[files_start + bracket_start + 1..files_start + bracket_end];
                    result.file_names =
                        list.split(',').map(|s| s.trim().trim_matches('"')).filter(|s| !s.is_empty()).map(|s| dir.join(s)).collect();
                    result.has_include = false;
                }
            }
            result
        }
    }

    fn open(coordinator: &Coordinator, path: &str) -> OpenResult {
        coordinator.open_client_file(OpenFileArgs {
            path: PathBuf::from(path),
            contents: Some(String::new()),
            kind: Some(ScriptKind::Ts),
            project_root_path: None,
        })
    }

    #[test]
    fn no_ancestor_config_creates_inferred_project_with_no_armed_watch() {
        let host = Arc::new(MockHost::new());
        let coordinator = coordinator_with(Arc::clone(&host));

        let result = open(&coordinator, "/a/b/c.ts");

        assert!(result.config_file_name.is_none());
        let project = coordinator.get_default_project_for_file(Path::new("/a/b/c.ts"), false);
        assert!(matches!(project, Some(ProjectKey::Inferred(_))));
        // No presence entry should have become Ghost-watched: nothing exists
        // anywhere above this file, so no config watcher is armed below "/".
        for dir in ["/a/b", "/a", "/"] {
            for name in ["project.json", "project.local.json"] {
                let candidate = PathBuf::from(dir).join(name);
                if let Some(state) = coordinator.debug_presence_state(&candidate) {
                    assert_ne!(state, PresenceState::GhostWatched);
                }
            }
        }
    }

    /// Spec §8 Property 3: watcher-present iff `!open && !mixed && known`,
    /// for an ordinary open/close cycle and for an external mixed-content
    /// root, which must never be watched even while closed.
    #[test]
    fn watcher_present_iff_closed_and_not_mixed() {
        let host = Arc::new(MockHost::new());
        let coordinator = coordinator_with(Arc::clone(&host));

        open(&coordinator, "/a/b/c.ts");
        coordinator.debug_assert_watcher_invariants();
        assert_eq!(host.watch_count(), 0);

        coordinator.close_client_file(Path::new("/a/b/c.ts"));
        coordinator.debug_assert_watcher_invariants();
        assert_eq!(host.watch_count(), 1);

        coordinator.open_external_project(ExternalProjectSpec {
            name: "proj".into(),
            roots: vec![PathBuf::from("vendor/widget.html")],
            options: CompilerOptions::default(),
            embedded_config_files: Vec::new(),
            mixed_content_roots: HashSet::from([PathBuf::from("vendor/widget.html")]),
        });
        coordinator.debug_assert_watcher_invariants();
        // The mixed-content root is closed (never opened by the client) yet
        // must stay unwatched; the watch count is unchanged from before.
        assert_eq!(host.watch_count(), 1);
    }

    #[test]
    fn ancestor_config_is_adopted_instead_of_inferred() {
        let host = Arc::new(MockHost::new());
        host.set_file("/a/project.json", "{}");
        let coordinator = coordinator_with(Arc::clone(&host));

        let result = open(&coordinator, "/a/b/c.ts");

        assert_eq!(result.config_file_name, Some(PathBuf::from("/a/project.json")));
        let key = ProjectKey::Configured(PathBuf::from("/a/project.json"));
        assert!(coordinator.debug_has_project(&key));
        assert_eq!(coordinator.debug_open_ref_count(&key), 1);
    }

    #[test]
    fn closing_the_last_open_file_tears_down_its_configured_project() {
        let host = Arc::new(MockHost::new());
        host.set_file("/a/project.json", "{}");
        let coordinator = coordinator_with(Arc::clone(&host));
        open(&coordinator, "/a/b/c.ts");

        let key = ProjectKey::Configured(PathBuf::from("/a/project.json"));
        assert!(coordinator.debug_has_project(&key));

        coordinator.close_client_file(Path::new("/a/b/c.ts"));

        assert!(!coordinator.debug_has_project(&key));
    }

    /// Closing one of two open files sharing a Configured project must leave
    /// the surviving project's membership (and the closed file's watcher)
    /// intact, rather than severing the now-closed root from the project.
    #[test]
    fn closing_one_of_two_open_files_keeps_the_other_rooted_in_its_configured_project() {
        let host = Arc::new(MockHost::new());
        host.set_file("/a/project.json", "{}");
        let coordinator = coordinator_with(Arc::clone(&host));
        open(&coordinator, "/a/b/c.ts");
        open(&coordinator, "/a/b/d.ts");

        let key = ProjectKey::Configured(PathBuf::from("/a/project.json"));
        assert_eq!(coordinator.debug_open_ref_count(&key), 2);

        coordinator.close_client_file(Path::new("/a/b/c.ts"));

        assert!(coordinator.debug_has_project(&key));
        assert_eq!(coordinator.debug_open_ref_count(&key), 1);
        let roots = coordinator.debug_project_roots(&key);
        assert!(roots.contains(&PathBuf::from("/a/b/c.ts")), "closed root must remain a known member of the surviving project");
        let info = coordinator.get_script_info(Path::new("/a/b/c.ts")).unwrap();
        assert!(info.containing_projects.contains(&key));
    }

    /// A duplicate open of an already-open file must not inflate the
    /// project's open-ref count, or a single later close would leave it
    /// stuck above zero and the project would never tear down.
    #[test]
    fn duplicate_open_of_an_already_open_file_does_not_inflate_open_ref_count() {
        let host = Arc::new(MockHost::new());
        host.set_file("/a/project.json", "{}");
        let coordinator = coordinator_with(Arc::clone(&host));
        open(&coordinator, "/a/b/c.ts");
        open(&coordinator, "/a/b/c.ts");

        let key = ProjectKey::Configured(PathBuf::from("/a/project.json"));
        assert_eq!(coordinator.debug_open_ref_count(&key), 1);

        coordinator.close_client_file(Path::new("/a/b/c.ts"));

        assert!(!coordinator.debug_has_project(&key));
    }

    #[test]
    fn deleting_an_adopted_config_falls_back_to_inferred_and_rearms_ghost_watch() {
        let host = Arc::new(MockHost::new());
        host.set_file("/a/project.json", "{}");
        let coordinator = coordinator_with(Arc::clone(&host));
        open(&coordinator, "/a/b/c.ts");

        let configured_key = ProjectKey::Configured(PathBuf::from("/a/project.json"));
        assert!(coordinator.debug_has_project(&configured_key));

        host.remove_file(Path::new("/a/project.json"));
        host.fire(Path::new("/a/project.json"), crate::host::WatchEventKind::Deleted);

        assert!(!coordinator.debug_has_project(&configured_key));
        let project = coordinator.get_default_project_for_file(Path::new("/a/b/c.ts"), false);
        assert!(matches!(project, Some(ProjectKey::Inferred(_))));
        assert_eq!(coordinator.debug_presence_state(Path::new("/a/project.json")), Some(PresenceState::GhostWatched));
    }

    #[test]
    fn single_inferred_mode_groups_every_orphan_under_one_project() {
        let host = Arc::new(MockHost::new());
        let coordinator = coordinator_with(Arc::clone(&host));
        coordinator.set_single_inferred_mode(true);

        open(&coordinator, "/x/one.ts");
        open(&coordinator, "/y/two.ts");

        let key_one = coordinator.get_default_project_for_file(Path::new("/x/one.ts"), false).unwrap();
        let key_two = coordinator.get_default_project_for_file(Path::new("/y/two.ts"), false).unwrap();
        assert_eq!(key_one, key_two);
        assert_eq!(coordinator.debug_project_roots(&key_one).len(), 2);
    }

    #[test]
    fn file_not_named_in_an_explicit_files_list_falls_through_to_inferred() {
        let host = Arc::new(MockHost::new());
        host.set_file("/a/project.json", r#"{"files":["b/c.ts"]}"#);
        let coordinator = Coordinator::with_collaborators(
            Arc::clone(&host) as Arc<dyn crate::host::Host>,
            Arc::new(FilesListConfigParser),
            Arc::new(crate::collaborators::NullTypingsInstaller),
            Arc::new(crate::events::NullEventSink),
            ConfigFileNames::default(),
        );

        open(&coordinator, "/a/b/c.ts");
        let result = open(&coordinator, "/a/b/d.ts");

        let configured_key = ProjectKey::Configured(PathBuf::from("/a/project.json"));
        assert_eq!(result.config_file_name, Some(PathBuf::from("/a/project.json")));
        assert_eq!(coordinator.debug_project_roots(&configured_key), vec![PathBuf::from("/a/b/c.ts")]);

        let d_project = coordinator.get_default_project_for_file(Path::new("/a/b/d.ts"), false);
        assert!(matches!(d_project, Some(ProjectKey::Inferred(_))));

        let c_projects = coordinator.get_script_info(Path::new("/a/b/c.ts")).unwrap().containing_projects;
        assert_eq!(c_projects, vec![configured_key]);
    }

    #[test]
    fn default_mode_gives_each_orphan_its_own_inferred_project() {
        let host = Arc::new(MockHost::new());
        let coordinator = coordinator_with(Arc::clone(&host));

        open(&coordinator, "/x/one.ts");
        open(&coordinator, "/y/two.ts");

        let key_one = coordinator.get_default_project_for_file(Path::new("/x/one.ts"), false).unwrap();
        let key_two = coordinator.get_default_project_for_file(Path::new("/y/two.ts"), false).unwrap();
        assert_ne!(key_one, key_two);
        assert_eq!(coordinator.debug_project_roots(&key_one).len(), 1);
    }

    #[test]
    fn editing_an_open_file_eventually_rebuilds_its_project_graph() {
        let host = Arc::new(MockHost::new());
        host.set_file("/a/project.json", "{}");
        let coordinator = coordinator_with(Arc::clone(&host));
        open(&coordinator, "/a/b/c.ts");

        let key = ProjectKey::Configured(PathBuf::from("/a/project.json"));
        let before = coordinator.debug_graph_version(&key);

        coordinator.apply_changes_in_open_files(
            Vec::new(),
            vec![FileChange { path: PathBuf::from("/a/b/c.ts"), edits: vec![TextEdit { start: 0, end: 0, text: "x".into() }] }],
            Vec::new(),
        );
        coordinator.wait_for_quiescence();

        assert!(coordinator.debug_graph_version(&key) > before);
    }

    #[test]
    fn opening_or_closing_in_a_batch_forces_immediate_reconciliation() {
        let host = Arc::new(MockHost::new());
        let coordinator = coordinator_with(Arc::clone(&host));

        coordinator.apply_changes_in_open_files(
            vec![OpenFileArgs { path: PathBuf::from("/z/only.ts"), contents: Some(String::new()), kind: Some(ScriptKind::Ts), project_root_path: None }],
            Vec::new(),
            Vec::new(),
        );

        // No wait_for_quiescence call: the batch contained an open, so the
        // inferred project must already exist synchronously.
        assert!(coordinator.get_default_project_for_file(Path::new("/z/only.ts"), false).is_some());
    }

    #[test]
    fn external_project_safelist_excludes_vendored_root_and_requests_typings() {
        let host = Arc::new(MockHost::new());
        host.set_file("/safelist.json", r#"{"jquery": {"match": "jquery.*\\.js$", "types": ["jquery"]}}"#);
        let coordinator = coordinator_with(Arc::clone(&host));
        coordinator.load_safelist(Path::new("/safelist.json")).unwrap();

        coordinator.open_external_project(ExternalProjectSpec {
            name: "proj".into(),
            roots: vec![PathBuf::from("lib/jquery-1.10.2.min.js"), PathBuf::from("src/app.ts")],
            options: CompilerOptions::default(),
            embedded_config_files: Vec::new(),
            mixed_content_roots: HashSet::new(),
        });

        let key = ProjectKey::External("proj".into());
        let roots = coordinator.debug_project_roots(&key);
        assert_eq!(roots, vec![PathBuf::from("src/app.ts")]);
    }

    #[test]
    fn open_external_projects_closes_projects_absent_from_the_new_list() {
        let host = Arc::new(MockHost::new());
        let coordinator = coordinator_with(Arc::clone(&host));
        coordinator.open_external_project(ExternalProjectSpec {
            name: "first".into(),
            roots: vec![PathBuf::from("a.ts")],
            options: CompilerOptions::default(),
            embedded_config_files: Vec::new(),
            mixed_content_roots: HashSet::new(),
        });
        let first_key = ProjectKey::External("first".into());
        assert!(coordinator.debug_has_project(&first_key));

        coordinator.open_external_projects(vec![ExternalProjectSpec {
            name: "second".into(),
            roots: vec![PathBuf::from("b.ts")],
            options: CompilerOptions::default(),
            embedded_config_files: Vec::new(),
            mixed_content_roots: HashSet::new(),
        }]);

        assert!(!coordinator.debug_has_project(&first_key));
        assert!(coordinator.debug_has_project(&ProjectKey::External("second".into())));
    }

    /// Spec scenario S5: an external project declaring `p.js` (2 MiB) and
    /// `q.js` (19 MiB) with default options exceeds the 20 MiB budget, so the
    /// language service is disabled while both scripts remain in the project
    /// and no wildcard/type-root watchers are armed; telemetry reflects the
    /// disabled state.
    #[test]
    fn large_external_project_disables_language_service_without_dropping_it() {
        const MIB: usize = 1024 * 1024;
        let host = Arc::new(MockHost::new());
        host.set_file("p.js", "x".repeat(2 * MIB));
        host.set_file("q.js", "x".repeat(19 * MIB));
        let events = Arc::new(crate::events::RecordingEventSink::new());
        let coordinator = Coordinator::with_collaborators(
            Arc::clone(&host) as Arc<dyn crate::host::Host>,
            Arc::new(NullConfigFileParser),
            Arc::new(NullTypingsInstaller),
            events.clone(),
            ConfigFileNames::default(),
        );

        coordinator.open_external_project(ExternalProjectSpec {
            name: "proj".into(),
            roots: vec![PathBuf::from("p.js"), PathBuf::from("q.js")],
            options: CompilerOptions::default(),
            embedded_config_files: Vec::new(),
            mixed_content_roots: HashSet::new(),
        });

        let key = ProjectKey::External("proj".into());
        assert!(coordinator.debug_has_project(&key));
        assert_eq!(coordinator.debug_language_service_enabled(&key), Some(false));
        assert_eq!(coordinator.debug_project_roots(&key), vec![PathBuf::from("p.js"), PathBuf::from("q.js")]);
        assert_eq!(coordinator.debug_project_watcher_counts(&key), (0, 0));

        let telemetry_saw_disabled = events.drain().into_iter().any(|event| {
            matches!(event, Event::ProjectInfoTelemetry(telemetry) if telemetry.project_type == "external" && !telemetry.language_service_enabled)
        });
        assert!(telemetry_saw_disabled, "expected a project-info-telemetry event with languageServiceEnabled=false");
    }
}
