//! Errors the coordinator itself can produce.
//!
//! Collaborator failures (config parse, filesystem reads) are deliberately
//! *not* represented here: per the error-handling design they become
//! diagnostics attached to a project or a logged, degrading no-op. This enum
//! is for the small set of conditions that are genuinely the caller's fault
//! or a bug in the coordinator.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// `closeClientFile` or a similar entry point was asked about a path the
    /// registry has never seen. Callers should treat this as a no-op, not
    /// propagate it; it is exposed so tests can assert on it.
    #[error("no script known for path {0:?}")]
    UnknownScript(PathBuf),

    /// A project name passed to a public entry point does not exist.
    #[error("no project named {0:?}")]
    UnknownProject(String),
}
