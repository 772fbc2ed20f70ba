//! Scenario-level and property-level integration tests against the public
//! API, exercised through `MockHost` exactly as the `#[cfg(test)]` modules
//! colocated with each component exercise their own internals. These cover
//! the cross-cutting invariants of spec §8 that don't belong to any single
//! module: membership completeness, inferred uniqueness, debounce
//! coalescing, edit idempotence, and the external-project round trip.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use project_coordinator::collaborators::{ConfigFileParser, NullConfigFileParser, NullTypingsInstaller, ParsedConfigFile};
use project_coordinator::coordinator::{ExternalProjectSpec, FileChange, OpenFileArgs, TextEdit};
use project_coordinator::events::{Event, RecordingEventSink};
use project_coordinator::host::{Host, MockHost};
use project_coordinator::project::{CompilerOptions, ProjectKey};
use project_coordinator::script::ScriptKind;
use project_coordinator::Coordinator;

fn open(coordinator: &Coordinator, path: &str) {
    coordinator.open_client_file(OpenFileArgs {
        path: PathBuf::from(path),
        contents: Some(String::new()),
        kind: Some(ScriptKind::Ts),
        project_root_path: None,
    });
}

/// Minimal stand-in for the out-of-scope compiler front-end: honors an
/// explicit `"files"` allowlist so tests can exercise the claim-vs-fall-
/// through behavior an on-disk config with a narrow `files` list produces.
struct FilesListConfigParser;

impl ConfigFileParser for FilesListConfigParser {
    fn parse(&self, config_path: &Path, text: &str) -> ParsedConfigFile {
        let mut result = ParsedConfigFile::default();
        let dir = config_path.parent().unwrap_or_else(|| Path::new("/"));
        if let Some(files_start) = text.find("\"files\"") {
            if let (Some(bracket_start), Some(bracket_end)) = (text[files_start..].find('['), text[files_start..].find(']')) {
                let list = &text[files_start + bracket_start + 1..files_start + bracket_end];
                result.file_names = list.split(',').map(|s| s.trim().trim_matches('"')).filter(|s| !s.is_empty()).map(|s| dir.join(s)).collect();
            }
        }
        result
    }
}

/// Property 1: after any entry point returns and every scheduled task
/// drains, every open file belongs to at least one project.
#[test]
fn every_open_file_has_a_containing_project_at_quiescence() {
    let host = Arc::new(MockHost::new());
    host.set_file("/a/project.json", "{}");
    let coordinator = Coordinator::new(host);

    open(&coordinator, "/a/b/c.ts");
    open(&coordinator, "/a/b/d.ts");
    open(&coordinator, "/elsewhere/orphan.ts");
    coordinator.wait_for_quiescence();

    for path in ["/a/b/c.ts", "/a/b/d.ts", "/elsewhere/orphan.ts"] {
        let info = coordinator.get_script_info(std::path::Path::new(path)).expect("script must be known");
        assert!(!info.containing_projects.is_empty(), "{} has no containing project", path);
    }
}

/// Property 2: no file is simultaneously a root of an Inferred project and a
/// root/reference of any other project. Reproduces scenario S3: a Configured
/// project's `files` list names one sibling but not the other.
#[test]
fn inferred_root_never_overlaps_another_project() {
    let host = Arc::new(MockHost::new());
    host.set_file("/a/project.json", r#"{"files":["b/c.ts"]}"#);
    let coordinator = Coordinator::with_collaborators(
        Arc::clone(&host) as Arc<dyn Host>,
        Arc::new(FilesListConfigParser),
        Arc::new(NullTypingsInstaller),
        Arc::new(project_coordinator::events::NullEventSink),
        Default::default(),
    );

    open(&coordinator, "/a/b/c.ts");
    open(&coordinator, "/a/b/d.ts");
    coordinator.wait_for_quiescence();

    let configured_key = ProjectKey::Configured(PathBuf::from("/a/project.json"));
    let d_containing = coordinator.get_script_info(std::path::Path::new("/a/b/d.ts")).unwrap().containing_projects;
    assert!(!d_containing.contains(&configured_key));

    let d_project = coordinator.get_default_project_for_file(std::path::Path::new("/a/b/d.ts"), false).unwrap();
    assert!(matches!(d_project, ProjectKey::Inferred(_)));
    assert_ne!(d_project, configured_key);

    let c_projects = coordinator.get_script_info(std::path::Path::new("/a/b/c.ts")).unwrap().containing_projects;
    assert!(c_projects.iter().all(|k| !matches!(k, ProjectKey::Inferred(_))));
}

/// Property 5: N mutations to the same project inside the debounce window
/// produce exactly one graph-update call, observed here as exactly one
/// `ContextChanged` event for that project despite five separate edits.
#[test]
fn bursts_of_edits_coalesce_into_one_graph_update() {
    let host = Arc::new(MockHost::new());
    host.set_file("/a/project.json", "{}");
    let sink = Arc::new(RecordingEventSink::new());
    let coordinator = Coordinator::with_collaborators(
        host,
        Arc::new(NullConfigFileParser),
        Arc::new(NullTypingsInstaller),
        sink.clone(),
        Default::default(),
    );
    open(&coordinator, "/a/b/c.ts");
    sink.drain();

    for i in 0..5 {
        coordinator.apply_changes_in_open_files(
            Vec::new(),
            vec![FileChange {
                path: PathBuf::from("/a/b/c.ts"),
                edits: vec![TextEdit { start: 0, end: 0, text: format!("edit{}", i) }],
            }],
            Vec::new(),
        );
    }
    coordinator.wait_for_quiescence();

    let key = ProjectKey::Configured(PathBuf::from("/a/project.json"));
    let context_changed_count = sink
        .drain()
        .into_iter()
        .filter(|event| matches!(event, Event::ContextChanged { project, .. } if *project == key))
        .count();
    assert_eq!(context_changed_count, 1);
}

/// Property 6: applying the empty edit batch is a no-op — no events fire and
/// nothing is scheduled.
#[test]
fn empty_edit_batch_is_a_no_op() {
    let host = Arc::new(MockHost::new());
    let sink = Arc::new(RecordingEventSink::new());
    let coordinator = Coordinator::with_collaborators(
        host,
        Arc::new(NullConfigFileParser),
        Arc::new(NullTypingsInstaller),
        sink.clone(),
        Default::default(),
    );
    open(&coordinator, "/a/b/c.ts");
    coordinator.wait_for_quiescence();
    sink.drain();

    coordinator.apply_changes_in_open_files(Vec::new(), Vec::new(), Vec::new());
    coordinator.wait_for_quiescence();

    assert!(sink.drain().is_empty());
}

/// Property 7: calling `openExternalProjects(L)` twice in a row leaves the
/// project set and every project's root set equal to after the first call.
#[test]
fn reapplying_the_same_external_project_list_is_idempotent() {
    let host = Arc::new(MockHost::new());
    let coordinator = Coordinator::new(host);

    let specs = vec![
        ExternalProjectSpec {
            name: "first".into(),
            roots: vec![PathBuf::from("a.ts"), PathBuf::from("b.ts")],
            options: CompilerOptions::default(),
            embedded_config_files: Vec::new(),
            mixed_content_roots: HashSet::new(),
        },
        ExternalProjectSpec {
            name: "second".into(),
            roots: vec![PathBuf::from("c.ts")],
            options: CompilerOptions::default(),
            embedded_config_files: Vec::new(),
            mixed_content_roots: HashSet::new(),
        },
    ];

    coordinator.open_external_projects(specs.clone());
    let first_key = ProjectKey::External("first".into());
    let second_key = ProjectKey::External("second".into());
    let first_summary_before = coordinator.find_project("first").unwrap();
    let second_summary_before = coordinator.find_project("second").unwrap();

    coordinator.open_external_projects(specs);

    let first_summary_after = coordinator.find_project("first").unwrap();
    let second_summary_after = coordinator.find_project("second").unwrap();
    assert_eq!(first_summary_after.root_count, first_summary_before.root_count);
    assert_eq!(second_summary_after.root_count, second_summary_before.root_count);
    for path in ["a.ts", "b.ts"] {
        assert!(coordinator.get_script_info(Path::new(path)).unwrap().containing_projects.contains(&first_key));
    }
    assert!(coordinator.get_script_info(Path::new("c.ts")).unwrap().containing_projects.contains(&second_key));
}
