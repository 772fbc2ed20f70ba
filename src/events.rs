//! Emitted events (spec §6): fire-and-forget notifications the coordinator
//! sends to a single registered handler, the same shape as `rls`'s
//! `ProgressNotifier`/`BuildDiagnosticsNotifier` callbacks in
//! `actions/progress.rs`.

use std::path::PathBuf;

use crate::project::ProjectKey;

#[derive(Debug, Clone)]
pub struct ConfigFileDiagnostics {
    pub trigger_file: PathBuf,
    pub config_file_name: PathBuf,
    pub diagnostics: Vec<String>,
}

/// A scrubbed telemetry record: hashed project id, extension counts,
/// enum-valued options stringified, path-bearing options omitted entirely,
/// per spec §6.
#[derive(Debug, Clone)]
pub struct ProjectInfoTelemetry {
    pub hashed_project_id: String,
    pub project_type: &'static str,
    pub extension_counts: Vec<(String, u32)>,
    pub enum_options: Vec<(String, String)>,
    pub language_service_enabled: bool,
}

#[derive(Debug, Clone)]
pub enum Event {
    ContextChanged { project: ProjectKey, file: PathBuf },
    ConfigFileDiagnostics(ConfigFileDiagnostics),
    LanguageServiceState { project: ProjectKey, enabled: bool },
    ProjectInfoTelemetry(ProjectInfoTelemetry),
}

/// Single fire-and-forget handler for emitted events. The coordinator holds
/// exactly one (spec §6, "single handler").
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Handler that drops every event; useful for tests that don't assert on
/// telemetry/diagnostics.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: Event) {}
}

/// Handler that records every event, in order, for test assertions.
#[derive(Default)]
pub struct RecordingEventSink {
    events: std::sync::Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> RecordingEventSink {
        RecordingEventSink { events: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut self.events.lock().unwrap())
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}
