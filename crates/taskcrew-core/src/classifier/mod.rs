//! Task classification and resource allocation.
//!
//! [`classify`] maps request text to a [`TaskType`] using a fixed-priority
//! list of category predicates (see [`rules::CATEGORY_RULES`]). The task type
//! then selects roles through a static table, and the roles select phases.
//! Everything here is a pure function of its inputs.

pub mod allocation;
pub mod rules;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::roles::{Phase, Role};

pub use allocation::{get_required_phases, get_required_roles, RoleRequirements};

/// The classification bucket that drives role selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    FullProject,
    ProofOfConcept,
    Qa,
    CodeReview,
    BugFix,
    Documentation,
    TestGeneration,
    Refactoring,
    SecurityAudit,
    FeatureAddition,
}

impl TaskType {
    pub const ALL: [TaskType; 10] = [
        TaskType::FullProject,
        TaskType::ProofOfConcept,
        TaskType::Qa,
        TaskType::CodeReview,
        TaskType::BugFix,
        TaskType::Documentation,
        TaskType::TestGeneration,
        TaskType::Refactoring,
        TaskType::SecurityAudit,
        TaskType::FeatureAddition,
    ];
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::FullProject => "full_project",
            TaskType::ProofOfConcept => "proof_of_concept",
            TaskType::Qa => "qa",
            TaskType::CodeReview => "code_review",
            TaskType::BugFix => "bug_fix",
            TaskType::Documentation => "documentation",
            TaskType::TestGeneration => "test_generation",
            TaskType::Refactoring => "refactoring",
            TaskType::SecurityAudit => "security_audit",
            TaskType::FeatureAddition => "feature_addition",
        };
        write!(f, "{s}")
    }
}

/// Classify without reporting whether the default was used.
pub fn classify(text: &str) -> TaskType {
    classify_detailed(text).0
}

/// Classify, returning `(task_type, defaulted)`.
///
/// `defaulted` is true when no category predicate matched, including for
/// empty text. Classification never fails.
pub fn classify_detailed(text: &str) -> (TaskType, bool) {
    let lowered = text.to_lowercase();
    if lowered.trim().is_empty() {
        return (TaskType::FullProject, true);
    }
    rules::compiled_rules()
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| (rule.task_type, false))
        .unwrap_or((TaskType::FullProject, true))
}

/// Complete classification of one request.
///
/// Built once per iteration and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskClassification {
    pub task_type: TaskType,
    pub required_roles: BTreeSet<Role>,
    /// Ordered by pipeline position.
    pub required_phases: Vec<Phase>,
    pub integration_requested: bool,
    /// No predicate matched; the full-project default was applied.
    pub defaulted: bool,
}

impl TaskClassification {
    pub fn from_text(text: &str, integration_requested: bool) -> Self {
        let (task_type, defaulted) = classify_detailed(text);
        let required_roles = get_required_roles(task_type, integration_requested).required();
        let required_phases = get_required_phases(&required_roles);
        Self {
            task_type,
            required_roles,
            required_phases,
            integration_requested,
            defaulted,
        }
    }

    pub fn requires(&self, role: Role) -> bool {
        self.required_roles.contains(&role)
    }

    pub fn is_active(&self, phase: Phase) -> bool {
        self.required_phases.contains(&phase)
    }

    /// Phases that will not run, in pipeline order.
    pub fn skipped_phases(&self) -> Vec<Phase> {
        Phase::ALL
            .into_iter()
            .filter(|p| !self.is_active(*p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_defaults_to_full_project() {
        assert_eq!(classify_detailed(""), (TaskType::FullProject, true));
        assert_eq!(classify_detailed("   \n"), (TaskType::FullProject, true));
    }

    #[test]
    fn test_unmatched_text_defaults() {
        let (t, defaulted) = classify_detailed("Build an online bookstore with a catalog");
        assert_eq!(t, TaskType::FullProject);
        assert!(defaulted);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("Write the README"), TaskType::Documentation);
        assert_eq!(classify("WRITE THE README"), TaskType::Documentation);
    }

    #[test]
    fn test_specific_category_beats_general() {
        // "review" and "bug" both match; code review is checked first
        assert_eq!(classify("review the bug report handler"), TaskType::CodeReview);
    }

    #[test]
    fn test_classification_skips_inactive_phases() {
        let c = TaskClassification::from_text("Build a quick POC for a CLI calculator", false);
        assert_eq!(c.required_phases, vec![Phase::Build]);
        assert_eq!(
            c.skipped_phases(),
            vec![Phase::Plan, Phase::Review, Phase::Test, Phase::Integrate]
        );
    }
}
