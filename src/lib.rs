//! Coordinates the project set of a long-running language-analysis server:
//! derives file-to-project membership, watches configuration and source
//! files, and debounces compilation-graph rebuilds.
//!
//! The [`coordinator::Coordinator`] is the crate's single entry point; every
//! other module is a collaborator it depends on, in the same shape `rls`'s
//! `ActionContext` depends on `rls_vfs::Vfs`, `rls_analysis::AnalysisHost`,
//! and `BuildQueue`.

pub mod collaborators;
pub mod concurrency;
pub mod config;
pub mod config_presence;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod host;
pub mod project;
pub mod safelist;
pub mod scheduler;
pub mod script;
pub mod size_gate;

pub use coordinator::{Coordinator, ExternalProjectSpec, FileChange, OpenFileArgs, OpenResult, TextEdit};
pub use error::CoordinatorError;
pub use host::{Host, MockHost, RealHost, SharedHost};
pub use project::ProjectKey;
