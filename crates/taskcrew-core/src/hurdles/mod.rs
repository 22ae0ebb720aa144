//! Hurdle detection: risk items extracted from phase output.

pub mod detector;
pub mod severity;

use serde::{Deserialize, Serialize};

use crate::roles::Phase;

pub use detector::{detect, should_escalate, HurdleDetector};
pub use severity::Severity;

/// Words that mark a line as reporting a hurdle as handled.
const RESOLUTION_WORDS: &[&str] = &["resolved", "fixed", "addressed", "mitigated"];

/// How many leading characters of an issue are matched when looking for a
/// later resolution mention.
const ISSUE_MATCH_CHARS: usize = 60;

/// A detected risk or issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hurdle {
    pub issue: String,
    pub severity: Severity,
    pub context: String,
    pub suggestions: Vec<String>,
    pub resolved: bool,
}

impl Hurdle {
    pub fn new(issue: impl Into<String>, severity: Severity) -> Self {
        Self {
            issue: issue.into(),
            severity,
            context: String::new(),
            suggestions: Vec::new(),
            resolved: false,
        }
    }

    /// Whether `output` reports this hurdle as handled.
    ///
    /// True when one line names the issue (its leading characters,
    /// case-insensitive) together with a resolution word.
    pub fn is_addressed_by(&self, output: &str) -> bool {
        let needle: String = self
            .issue
            .to_lowercase()
            .chars()
            .take(ISSUE_MATCH_CHARS)
            .collect();
        let needle = needle.trim();
        if needle.is_empty() {
            return false;
        }
        output.lines().any(|line| {
            let lowered = line.to_lowercase();
            lowered.contains(needle) && RESOLUTION_WORDS.iter().any(|w| lowered.contains(w))
        })
    }
}

/// A hurdle tagged with the phase that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedHurdle {
    pub phase: Phase,
    pub hurdle: Hurdle,
}

/// Run-wide hurdle ledger.
///
/// Phase results keep their own snapshot; only this log records later
/// resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HurdleLog {
    pub entries: Vec<LoggedHurdle>,
}

impl HurdleLog {
    pub fn extend(&mut self, phase: Phase, hurdles: &[Hurdle]) {
        self.entries.extend(hurdles.iter().cloned().map(|hurdle| LoggedHurdle { phase, hurdle }));
    }

    /// Mark earlier unresolved hurdles that `output` reports as handled.
    /// Returns how many were resolved.
    pub fn resolve_addressed(&mut self, current: Phase, output: &str) -> usize {
        let mut resolved = 0;
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.phase < current && !e.hurdle.resolved)
        {
            if entry.hurdle.is_addressed_by(output) {
                entry.hurdle.resolved = true;
                resolved += 1;
            }
        }
        resolved
    }

    /// Unresolved hurdles at CRITICAL severity.
    pub fn unresolved_critical(&self) -> Vec<&Hurdle> {
        self.entries
            .iter()
            .map(|e| &e.hurdle)
            .filter(|h| !h.resolved && h.severity == Severity::Critical)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addressed_requires_issue_and_resolution_word() {
        let h = Hurdle::new("Database migration may lock tables", Severity::High);
        assert!(
            h.is_addressed_by("Note: database migration may lock tables - fixed with batching")
        );
        assert!(!h.is_addressed_by("database migration may lock tables"));
        assert!(!h.is_addressed_by("everything resolved"));
    }

    #[test]
    fn test_log_resolves_only_earlier_phases() {
        let mut log = HurdleLog::default();
        log.extend(Phase::Plan, &[Hurdle::new("auth token leak", Severity::Critical)]);
        log.extend(Phase::Build, &[Hurdle::new("flaky cache", Severity::Critical)]);

        let resolved = log.resolve_addressed(
            Phase::Build,
            "auth token leak resolved\nflaky cache resolved",
        );
        assert_eq!(resolved, 1);
        let open: Vec<&str> = log
            .unresolved_critical()
            .iter()
            .map(|h| h.issue.as_str())
            .collect();
        assert_eq!(open, vec!["flaky cache"]);
    }
}
