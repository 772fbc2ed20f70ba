//! Size-limit gate (C6): a process-wide byte budget across projects for
//! non-TypeScript-extension ("non-source") files, spec §4.5.
//!
//! Accounting is a sum recomputed from the map on every call rather than a
//! maintained running total (spec §9, "size accounting"), which keeps the
//! invariant ("sum never exceeds budget") trivial to state and to check.

use std::collections::HashMap;
use std::path::Path;

use crate::project::ProjectKey;
use crate::script::ScriptKind;

/// 20 MiB, spec §4.5.
pub const DEFAULT_BUDGET_BYTES: u64 = 20 * 1024 * 1024;

pub struct SizeGate {
    budget: u64,
    accounted: HashMap<ProjectKey, u64>,
}

/// A file presented to the gate for admission.
pub struct CandidateFile<'a> {
    pub path: &'a Path,
    pub kind: ScriptKind,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Fits { non_source_bytes: u64 },
    Exceeds,
}

impl SizeGate {
    pub fn new(budget: u64) -> SizeGate {
        SizeGate { budget, accounted: HashMap::new() }
    }

    pub fn total_accounted(&self) -> u64 {
        self.accounted.values().sum()
    }

    fn available_excluding(&self, key: &ProjectKey) -> u64 {
        let used: u64 = self.accounted.iter().filter(|(k, _)| *k != key).map(|(_, v)| *v).sum();
        self.budget.saturating_sub(used)
    }

    /// Resets `key`'s accounted bytes to 0, then evaluates whether
    /// `candidates` fit in the remaining budget. Non-source bytes are
    /// summed with a short-circuit the moment the running total exceeds
    /// either the global budget or the space available after other
    /// projects' contributions (spec §4.5 steps 1-3).
    ///
    /// On `Fits`, the caller should record the total (via `commit`) and
    /// enable the language service; on `Exceeds`, the caller should disable
    /// it and tear down wildcard/type-root watchers, but the project still
    /// exists for open-file access.
    pub fn evaluate(&mut self, key: &ProjectKey, candidates: &[CandidateFile<'_>]) -> GateDecision {
        self.accounted.remove(key);
        let available = self.available_excluding(key);

        let mut total: u64 = 0;
        for candidate in candidates {
            if candidate.kind.is_source_extension() {
                continue;
            }
            total += candidate.size_bytes;
            if total > self.budget || total > available {
                return GateDecision::Exceeds;
            }
        }
        GateDecision::Fits { non_source_bytes: total }
    }

    pub fn commit(&mut self, key: ProjectKey, non_source_bytes: u64) {
        self.accounted.insert(key, non_source_bytes);
    }

    pub fn remove_project(&mut self, key: &ProjectKey) {
        self.accounted.remove(key);
    }
}

impl Default for SizeGate {
    fn default() -> Self {
        SizeGate::new(DEFAULT_BUDGET_BYTES)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn candidate(path: &str, kind: ScriptKind, size: u64) -> CandidateFile<'_> {
        CandidateFile { path: Path::new(path), kind, size_bytes: size }
    }

    #[test]
    fn sum_never_exceeds_budget() {
        let mut gate = SizeGate::new(10);
        let files = [candidate("a.js", ScriptKind::Js, 4), candidate("b.js", ScriptKind::Js, 4)];
        assert_eq!(gate.evaluate(&ProjectKey::External("p".into()), &files), GateDecision::Fits { non_source_bytes: 8 });
        gate.commit(ProjectKey::External("p".into()), 8);
        assert!(gate.total_accounted() <= 10);
    }

    #[test]
    fn exceeding_disables_without_partial_commit() {
        let mut gate = SizeGate::new(10);
        let files = [candidate("a.js", ScriptKind::Js, 6), candidate("b.js", ScriptKind::Js, 6)];
        assert_eq!(gate.evaluate(&ProjectKey::External("p".into()), &files), GateDecision::Exceeds);
        assert_eq!(gate.total_accounted(), 0);
    }

    #[test]
    fn source_extension_files_are_free() {
        let mut gate = SizeGate::new(1);
        let files = [candidate("a.ts", ScriptKind::Ts, 1_000_000)];
        assert_eq!(gate.evaluate(&ProjectKey::External("p".into()), &files), GateDecision::Fits { non_source_bytes: 0 });
    }

    #[test]
    fn later_project_sees_smaller_available_space() {
        let mut gate = SizeGate::new(10);
        gate.commit(ProjectKey::External("first".into()), 7);
        let files = [candidate("a.js", ScriptKind::Js, 4)];
        assert_eq!(gate.evaluate(&ProjectKey::External("second".into()), &files), GateDecision::Exceeds);
    }

    #[test]
    fn reload_recomputes_from_scratch() {
        let mut gate = SizeGate::new(10);
        gate.commit(ProjectKey::External("p".into()), 9);
        let files = [candidate("a.js", ScriptKind::Js, 2)];
        // Reloading resets this project's own entry before evaluating, so it
        // does not count against itself.
        assert_eq!(gate.evaluate(&ProjectKey::External("p".into()), &files), GateDecision::Fits { non_source_bytes: 2 });
    }
}
