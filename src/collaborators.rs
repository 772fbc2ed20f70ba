//! Contracts for the external collaborators spec §6 names: the compiler
//! front-end's config parser and the typings-acquisition subsystem. The
//! coordinator only ever depends on these traits, never a concrete
//! implementation -- the same shape as `rls_analysis::AnalysisHost` and
//! `rls_vfs::Vfs` being passed into `InitActionContext` by the teacher.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::project::CompilerOptions;

/// Type-acquisition preferences parsed out of a configuration file (or
/// supplied verbatim for an external project).
#[derive(Debug, Clone, Default)]
pub struct TypeAcquisition {
    pub enable: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Result of parsing a configuration file's text.
#[derive(Debug, Clone, Default)]
pub struct ParsedConfigFile {
    pub compiler_options: CompilerOptions,
    pub file_names: Vec<PathBuf>,
    pub wildcard_directories: HashMap<PathBuf, bool>,
    pub has_include: bool,
    pub has_exclude: bool,
    pub has_extends: bool,
    pub type_acquisition: TypeAcquisition,
    pub compile_on_save: bool,
    /// Parse diagnostics, attached to the project verbatim per spec §4.8;
    /// a non-fatal, possibly-partial parse still yields this record.
    pub diagnostics: Vec<String>,
}

/// The compiler front-end collaborator: parses configuration text and hands
/// back a language-service factory handle. Out of scope per spec §1; the
/// coordinator only needs the contract.
pub trait ConfigFileParser: Send + Sync {
    fn parse(&self, config_path: &std::path::Path, text: &str) -> ParsedConfigFile;
}

/// A parser that always yields an empty, diagnostics-bearing result; used
/// where a test doesn't care about real config semantics but still needs to
/// exercise the "config exists, adopt it" path.
pub struct NullConfigFileParser;

impl ConfigFileParser for NullConfigFileParser {
    fn parse(&self, _config_path: &std::path::Path, _text: &str) -> ParsedConfigFile {
        ParsedConfigFile::default()
    }
}

/// The typings-acquisition subsystem collaborator, spec §6.
pub trait TypingsInstaller: Send + Sync {
    fn update_typings_for_project(
        &self,
        project_name: &str,
        options: &CompilerOptions,
        acquisition: &TypeAcquisition,
        unresolved_imports: &[String],
        typings: &[String],
    );

    fn invalidate(&self, project_name: &str);
}

pub struct NullTypingsInstaller;

impl TypingsInstaller for NullTypingsInstaller {
    fn update_typings_for_project(&self, _: &str, _: &CompilerOptions, _: &TypeAcquisition, _: &[String], _: &[String]) {}

    fn invalidate(&self, _: &str) {}
}
