//! Project objects (C4): the three project variants and the shared header
//! they carry, modeled as a tagged enum with a small match on the tag rather
//! than a class hierarchy (spec §9, "runtime polymorphism over projects").

use std::collections::HashMap;
use std::path::PathBuf;

use crate::host::WatchHandle;

/// Stable identity for a project, used as the key type in the script-side
/// membership set and in the pending-updates map. Cheap to clone/hash/compare
/// so it can live on both sides of the (non-owning) script/project graph
/// described in spec §9.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProjectKey {
    External(String),
    Configured(PathBuf),
    Inferred(u64),
}

impl ProjectKey {
    /// External > Configured > Inferred, per the priority order in spec §4.6.
    pub fn priority(&self) -> u8 {
        match self {
            ProjectKey::External(_) => 2,
            ProjectKey::Configured(_) => 1,
            ProjectKey::Inferred(_) => 0,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            ProjectKey::External(name) => name.clone(),
            ProjectKey::Configured(path) => path.display().to_string(),
            ProjectKey::Inferred(id) => format!("/dev/null/inferred{}", id),
        }
    }
}

/// Verbatim compiler options, opaque to the coordinator. The real shape is
/// owned by the compiler front-end collaborator; the coordinator only needs
/// to hold, compare-by-identity-version and forward it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerOptions(pub HashMap<String, String>);

/// A handle to the compiler's cached program/graph for this project. The
/// compiler owns the real value; the coordinator only knows whether one has
/// ever been built and bumps a version stamp on rebuild.
#[derive(Debug, Clone, Default)]
pub struct GraphHandle {
    pub version: u64,
    pub built: bool,
}

impl GraphHandle {
    pub fn rebuild(&mut self) {
        self.version += 1;
        self.built = true;
    }
}

/// Watchers owned by a project: wildcard directories, type roots, and (for
/// Configured projects) the config file itself. Held uniquely; dropped on
/// project teardown (spec §5).
#[derive(Default)]
pub struct ProjectWatchers {
    pub config_file: Option<WatchHandle>,
    pub wildcard_directories: Vec<WatchHandle>,
    pub type_roots: Vec<WatchHandle>,
}

impl ProjectWatchers {
    pub fn clear(&mut self) {
        self.config_file = None;
        self.wildcard_directories.clear();
        self.type_roots.clear();
    }
}

/// Diagnostics attached to a project instead of raised as errors (spec §4.8).
#[derive(Debug, Clone, Default)]
pub struct ProjectDiagnostics {
    pub messages: Vec<String>,
}

impl ProjectDiagnostics {
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Shared header every project variant carries.
pub struct ProjectHeader {
    pub key: ProjectKey,
    pub options: CompilerOptions,
    pub compile_on_save: bool,
    pub language_service_enabled: bool,
    pub dirty: bool,
    pub roots: Vec<PathBuf>,
    pub graph: GraphHandle,
    pub watchers: ProjectWatchers,
    pub diagnostics: ProjectDiagnostics,
}

impl ProjectHeader {
    fn new(key: ProjectKey) -> ProjectHeader {
        ProjectHeader {
            key,
            options: CompilerOptions::default(),
            compile_on_save: false,
            language_service_enabled: true,
            dirty: true,
            roots: Vec::new(),
            graph: GraphHandle::default(),
            watchers: ProjectWatchers::default(),
            diagnostics: ProjectDiagnostics::default(),
        }
    }

    pub fn contains_root(&self, path: &PathBuf) -> bool {
        self.roots.iter().any(|r| r == path)
    }

    pub fn add_root(&mut self, path: PathBuf) {
        if !self.contains_root(&path) {
            self.roots.push(path);
            self.dirty = true;
        }
    }

    pub fn remove_root(&mut self, path: &PathBuf) {
        let before = self.roots.len();
        self.roots.retain(|r| r != path);
        if self.roots.len() != before {
            self.dirty = true;
        }
    }
}

/// Parsed include/exclude/file specs from an on-disk configuration file,
/// carried by Configured projects so reload can recompute roots without
/// re-deriving them from the coordinator's own state.
#[derive(Debug, Clone, Default)]
pub struct ConfigFileSpecs {
    pub files: Vec<PathBuf>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

pub struct ExternalProject {
    pub header: ProjectHeader,
    pub open_ref_count: u32,
}

pub struct ConfiguredProject {
    pub header: ProjectHeader,
    pub config_path: PathBuf,
    pub pending_reload: bool,
    pub specs: ConfigFileSpecs,
    pub open_ref_count: u32,
}

pub struct InferredProject {
    pub header: ProjectHeader,
}

/// The three project variants sharing a common header, dispatched by a small
/// match rather than dynamic dispatch (spec §9).
pub enum Project {
    External(ExternalProject),
    Configured(ConfiguredProject),
    Inferred(InferredProject),
}

impl Project {
    pub fn new_external(name: String) -> Project {
        Project::External(ExternalProject { header: ProjectHeader::new(ProjectKey::External(name)), open_ref_count: 0 })
    }

    pub fn new_configured(config_path: PathBuf) -> Project {
        Project::Configured(ConfiguredProject {
            header: ProjectHeader::new(ProjectKey::Configured(config_path.clone())),
            config_path,
            pending_reload: false,
            specs: ConfigFileSpecs::default(),
            open_ref_count: 0,
        })
    }

    pub fn new_inferred(id: u64) -> Project {
        Project::Inferred(InferredProject { header: ProjectHeader::new(ProjectKey::Inferred(id)) })
    }

    pub fn key(&self) -> ProjectKey {
        self.header().key.clone()
    }

    pub fn header(&self) -> &ProjectHeader {
        match self {
            Project::External(p) => &p.header,
            Project::Configured(p) => &p.header,
            Project::Inferred(p) => &p.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut ProjectHeader {
        match self {
            Project::External(p) => &mut p.header,
            Project::Configured(p) => &mut p.header,
            Project::Inferred(p) => &mut p.header,
        }
    }

    pub fn is_inferred(&self) -> bool {
        matches!(self, Project::Inferred(_))
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Project::Configured(_))
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Project::External(_))
    }

    /// Increment the positive-integer open-reference count Configured and
    /// External projects carry (spec §3). Inferred projects have no such
    /// counter; lifetime is tracked purely by root membership.
    pub fn inc_open_ref(&mut self) {
        match self {
            Project::External(p) => p.open_ref_count += 1,
            Project::Configured(p) => p.open_ref_count += 1,
            Project::Inferred(_) => {}
        }
    }

    /// Decrements the open-ref count and returns `true` if it (or, for
    /// Inferred, root emptiness) has dropped to zero and the project should
    /// be torn down.
    pub fn dec_open_ref(&mut self) -> bool {
        match self {
            Project::External(p) => {
                p.open_ref_count = p.open_ref_count.saturating_sub(1);
                p.open_ref_count == 0
            }
            Project::Configured(p) => {
                p.open_ref_count = p.open_ref_count.saturating_sub(1);
                p.open_ref_count == 0
            }
            Project::Inferred(p) => p.header.roots.is_empty(),
        }
    }

    pub fn taxonomic_kind(&self) -> &'static str {
        match self {
            Project::External(_) => "external",
            Project::Configured(_) => "configured",
            Project::Inferred(_) => "inferred",
        }
    }
}
