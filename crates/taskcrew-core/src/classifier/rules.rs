//! The ordered category predicates used by [`super::classify`].
//!
//! Order is part of the contract: the first matching category wins, so
//! reordering this table changes classification outcomes.

use std::sync::OnceLock;

use regex::Regex;

use super::TaskType;

/// `(category, patterns)` in priority order, most specific first.
///
/// A category matches when any one of its patterns matches the lowercased
/// request text.
pub const CATEGORY_RULES: &[(TaskType, &[&str])] = &[
    (
        TaskType::TestGeneration,
        &[
            r"\b(test.*generation|generate.*test|add.*test|create.*test)\b",
            r"\b(unit test|integration test|test.*file)\b",
            r"\b(test.*coverage|coverage.*target|test.*suite)\b",
            r"\b(ensure|achieve).*\b(\d+%|80%|coverage)\b",
        ],
    ),
    (
        TaskType::Qa,
        &[
            r"\b(test|testing|qa|quality assurance|test suite|test coverage)\b",
            r"\b(write|create|add|generate).*\b(test|tests|unit test|integration test)\b",
            r"\b(test.*coverage|coverage.*test|test.*suite)\b",
            r"\b(ensure|verify|validate).*\b(test|tests)\b",
        ],
    ),
    (
        TaskType::CodeReview,
        &[
            r"\b(review|code review|review code|audit code)\b",
            r"\b(check|analyze|examine).*\b(code|implementation|quality)\b",
            r"\b(code.*quality|quality.*code|code.*audit)\b",
        ],
    ),
    (
        TaskType::SecurityAudit,
        &[
            r"\b(security|audit|vulnerability|penetration|security.*scan)\b",
            r"\b(check|analyze|review).*\b(security|vulnerability|threat)\b",
            r"\b(owasp|security.*compliance|security.*review)\b",
        ],
    ),
    (
        TaskType::BugFix,
        &[
            r"\b(bug|fix|issue|error|bugfix|defect|patch)\b",
            r"\b(fix|resolve|correct|repair).*\b(bug|issue|error|problem)\b",
            r"\b(debug|troubleshoot|resolve)\b",
        ],
    ),
    (
        TaskType::Documentation,
        &[
            r"\b(documentation|docs|readme|api.*doc|docstring)\b",
            r"\b(write|create|add|generate).*\b(documentation|docs|readme)\b",
            r"\b(document|documenting)\b",
        ],
    ),
    (
        TaskType::Refactoring,
        &[
            r"\b(refactor|refactoring|restructure|reorganize|cleanup)\b",
            r"\b(improve|optimize|enhance).*\b(code|structure|architecture)\b",
            r"\b(code.*cleanup|clean.*code|improve.*code)\b",
        ],
    ),
    (
        TaskType::FeatureAddition,
        &[
            r"\b(feature|add.*feature|new.*feature|implement.*feature)\b",
            r"\b(enhancement|improvement|addition)\b",
        ],
    ),
    (
        TaskType::ProofOfConcept,
        &[
            r"\b(poc|proof of concept|prototype|demo|quick test|experiment)\b",
            r"\b(rapid|quick|simple|minimal|basic)\b.*\b(implementation|build|create|poc|prototype)\b",
            r"\b(just|only|simply)\b.*\b(code|implement|build)\b",
            r"\b(create|build|make)\b.*\b(poc|prototype|demo|quick|simple)\b",
        ],
    ),
];

/// A compiled category predicate.
pub struct CompiledRule {
    pub task_type: TaskType,
    pub patterns: Vec<Regex>,
}

impl CompiledRule {
    pub fn matches(&self, lowered: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(lowered))
    }
}

/// The compiled table, built once per process.
pub fn compiled_rules() -> &'static [CompiledRule] {
    static RULES: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        CATEGORY_RULES
            .iter()
            .map(|(task_type, patterns)| CompiledRule {
                task_type: *task_type,
                patterns: patterns.iter().filter_map(|p| Regex::new(p).ok()).collect(),
            })
            .collect()
    })
}
