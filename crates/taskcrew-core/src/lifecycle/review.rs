//! Peer-review scoring.

use std::sync::OnceLock;

use regex::Regex;

use crate::roles::Role;

/// A rating plus the qualitative feedback behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewAssessment {
    pub rating: u8,
    pub feedback: String,
}

/// Turns a work excerpt into a 1..=5 rating.
pub trait ReviewScorer: Send + Sync {
    fn assess(&self, reviewer: Role, reviewed: Role, excerpt: &str, context: &str)
        -> ReviewAssessment;
}

/// Failure signals as they appear in tool output, not in prose or type names.
const FAILURE_PATTERNS: &[(&str, &str)] = &[
    ("compile error", r"(?m)^\s*error(\[E\d+\])?:"),
    ("failed tests", r"\bFAILED\b|(?i)\b[1-9]\d* (tests? )?failed\b"),
    ("build failure", r"(?i)\b(build|compilation) failed\b"),
    ("traceback", r"(?i)\btraceback \(most recent call last\)"),
    ("panic", r"(?i)\bpanicked at\b"),
    ("uncaught exception", r"(?i)\b(uncaught|unhandled) exception\b"),
    (
        "unfinished work",
        r"\btodo!\(|\bunimplemented!\(|(?i)\bnot (yet )?implemented\b|(?m)^\s*(//|#)\s*TODO\b",
    ),
];

fn failure_patterns() -> &'static [(&'static str, Regex)] {
    static COMPILED: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        FAILURE_PATTERNS
            .iter()
            .filter_map(|(label, pattern)| Regex::new(pattern).ok().map(|re| (*label, re)))
            .collect()
    })
}

const PASS_MARKERS: &[&str] = &[
    "all tests passed",
    "tests passed",
    "lgtm",
    "approved",
    "\u{2705}",
    "\u{2713}",
];

/// Deterministic scorer driven by failure and success markers.
///
/// Empty work scores 1. Otherwise the score starts at 4, drops to 3 with
/// one or two distinct failure signals and to 2 with three or more, and
/// rises to 5 for clean output carrying a passing signal. Words such as
/// "error" in prose or `ParseError` in code are not failure signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicScorer;

impl ReviewScorer for HeuristicScorer {
    fn assess(
        &self,
        reviewer: Role,
        reviewed: Role,
        excerpt: &str,
        context: &str,
    ) -> ReviewAssessment {
        let trimmed = excerpt.trim();
        if trimmed.is_empty() {
            return ReviewAssessment {
                rating: 1,
                feedback: format!("{reviewer} found no {context} output from {reviewed}"),
            };
        }

        let failures: Vec<&str> = failure_patterns()
            .iter()
            .filter(|(_, re)| re.is_match(trimmed))
            .map(|(label, _)| *label)
            .collect();
        let lowered = trimmed.to_lowercase();
        let passing = PASS_MARKERS.iter().any(|m| lowered.contains(m));

        let (rating, reason) = match failures.len() {
            0 if passing => (5, "clean output with passing signals".to_string()),
            0 => (4, "no problems spotted".to_string()),
            1 | 2 => (3, format!("concerns: {}", failures.join(", "))),
            _ => (2, format!("repeated problems: {}", failures.join(", "))),
        };
        ReviewAssessment {
            rating,
            feedback: format!("{reviewer} rated {reviewed}'s {context} {rating}/5: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(excerpt: &str) -> u8 {
        HeuristicScorer
            .assess(Role::Reviewer, Role::Builder, excerpt, "build")
            .rating
    }

    #[test]
    fn test_empty_excerpt_scores_lowest() {
        assert_eq!(rate("   "), 1);
    }

    #[test]
    fn test_plain_output_scores_good() {
        assert_eq!(rate("Implemented the parser module."), 4);
    }

    #[test]
    fn test_passing_output_scores_excellent() {
        assert_eq!(rate("All tests passed"), 5);
    }

    #[test]
    fn test_failure_signals_lower_score() {
        assert_eq!(rate("error[E0308]: mismatched types\n --> src/lib.rs:4:5"), 3);
        let broken = "thread 'main' panicked at src/main.rs:3:5\n\
                      test parse ... FAILED\n\
                      Traceback (most recent call last):\n  File \"calc.py\"";
        assert_eq!(rate(broken), 2);
    }

    #[test]
    fn test_clean_error_handling_code_is_not_penalised() {
        let excerpt = "\
Implemented the parser. It returns an error on failure instead of a panic.

```rust:src/lib.rs
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(\"empty input\")]
    Empty,
}

pub fn parse(s: &str) -> Result<i64, ParseError> {
    s.trim().parse().map_err(|_| ParseError::Empty)
}
```
Exception handling in the CLI maps each error to an exit code.";
        assert_eq!(rate(excerpt), 4);
    }

    #[test]
    fn test_unfinished_code_is_flagged() {
        let a = HeuristicScorer.assess(
            Role::Reviewer,
            Role::Builder,
            "fn divide() {\n    todo!()\n}",
            "build",
        );
        assert_eq!(a.rating, 3);
        assert!(a.feedback.contains("unfinished work"));
    }

    #[test]
    fn test_feedback_names_both_roles() {
        let a = HeuristicScorer.assess(Role::Tester, Role::Builder, "ok", "build");
        assert!(a.feedback.contains("tester"));
        assert!(a.feedback.contains("builder"));
    }
}
