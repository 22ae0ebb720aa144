//! Line-oriented hurdle extraction.
//!
//! Recognises heading-style markers such as `Issue:`, `Severity: high` and
//! `Suggestion:`. Unmarked lines following an issue become its context.

use tracing::debug;

use super::{Hurdle, Severity};

const ISSUE_MARKERS: &[&str] = &["issue:", "problem:", "hurdle:", "challenge:", "risk:"];
const SUGGESTION_MARKERS: &[&str] = &["suggestion:", "solution:", "workaround:", "mitigation:"];
const SEVERITY_MARKER: &str = "severity:";

const FALLBACK_ISSUE: &str = "Potential technical challenges detected";
const FALLBACK_SUGGESTION: &str = "Review the analysis above for specific issues";
const FALLBACK_CONTEXT_CHARS: usize = 500;

/// Configurable detector. [`HurdleDetector::default`] uses the standard markers.
#[derive(Debug, Clone)]
pub struct HurdleDetector {
    issue_markers: Vec<String>,
    suggestion_markers: Vec<String>,
}

impl Default for HurdleDetector {
    fn default() -> Self {
        Self {
            issue_markers: ISSUE_MARKERS.iter().map(|s| s.to_string()).collect(),
            suggestion_markers: SUGGESTION_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

struct Draft {
    hurdle: Hurdle,
    context: Vec<String>,
}

impl Draft {
    fn finish(mut self) -> Hurdle {
        self.hurdle.context = self.context.join(" ");
        self.hurdle
    }
}

impl HurdleDetector {
    /// Add an extra issue marker, e.g. `"blocker:"` (builder pattern).
    pub fn with_issue_marker(mut self, marker: impl Into<String>) -> Self {
        self.issue_markers.push(marker.into().to_lowercase());
        self
    }

    /// Extract hurdles from `output`. `context` labels the phase in logs.
    pub fn detect(&self, output: &str, context: &str) -> Vec<Hurdle> {
        let mut hurdles = Vec::new();
        let mut current: Option<Draft> = None;

        for raw in output.lines() {
            let line = clean_line(raw);
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = strip_any_marker(&line, &self.issue_markers) {
                if let Some(draft) = current.take() {
                    hurdles.push(draft.finish());
                }
                let severity = explicit_severity(&line)
                    .or_else(|| Severity::from_keywords(&line))
                    .unwrap_or(Severity::Medium);
                let issue = rest.split_once('(').map_or(rest, |(head, _)| head).trim();
                current = Some(Draft {
                    hurdle: Hurdle::new(issue, severity),
                    context: Vec::new(),
                });
            } else if let Some(rest) = strip_marker(&line, SEVERITY_MARKER) {
                if let Some(draft) = current.as_mut() {
                    if let Some(level) = first_word(rest)
                        .and_then(Severity::parse)
                        .or_else(|| Severity::from_keywords(rest))
                    {
                        draft.hurdle.severity = level;
                    }
                }
            } else if let Some(rest) = strip_any_marker(&line, &self.suggestion_markers) {
                if let Some(draft) = current.as_mut() {
                    if !rest.is_empty() {
                        draft.hurdle.suggestions.push(rest.to_string());
                    }
                }
            } else if let Some(draft) = current.as_mut() {
                draft.context.push(line.clone());
            }
        }
        if let Some(draft) = current.take() {
            hurdles.push(draft.finish());
        }

        if hurdles.is_empty() && !output.trim().is_empty() {
            let mut fallback = Hurdle::new(FALLBACK_ISSUE, Severity::Medium);
            fallback.context = output.chars().take(FALLBACK_CONTEXT_CHARS).collect();
            fallback.suggestions.push(FALLBACK_SUGGESTION.to_string());
            hurdles.push(fallback);
        }

        debug!(context = %context, count = hurdles.len(), "hurdles detected");
        hurdles
    }
}

/// Detect hurdles with the default markers.
pub fn detect(output: &str, context: &str) -> Vec<Hurdle> {
    HurdleDetector::default().detect(output, context)
}

/// True iff the hurdle is HIGH or CRITICAL.
pub fn should_escalate(hurdle: &Hurdle) -> bool {
    hurdle.severity.requires_escalation()
}

/// Strip list bullets, numbering, heading hashes and bold markers.
fn clean_line(raw: &str) -> String {
    let without_bold = raw.replace("**", "").replace("__", "");
    let mut s = without_bold.trim();
    loop {
        let before = s;
        s = s.trim_start_matches(['-', '*', '+', '#', '>', '•']).trim_start();
        let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits > 0 {
            let rest = &s[digits..];
            if let Some(r) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
                s = r.trim_start();
            }
        }
        if s == before {
            break;
        }
    }
    s.trim_end().to_string()
}

fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let head = line.get(..marker.len())?;
    if head.eq_ignore_ascii_case(marker) {
        line.get(marker.len()..).map(str::trim)
    } else {
        None
    }
}

fn strip_any_marker<'a>(line: &'a str, markers: &[String]) -> Option<&'a str> {
    markers.iter().find_map(|m| strip_marker(line, m))
}

/// A `severity: <level>` annotation anywhere on the line.
fn explicit_severity(line: &str) -> Option<Severity> {
    let lowered = line.to_lowercase();
    let idx = lowered.find(SEVERITY_MARKER)?;
    first_word(&lowered[idx + SEVERITY_MARKER.len()..]).and_then(Severity::parse)
}

fn first_word(s: &str) -> Option<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_groups() {
        let text = "\
## Analysis
1. **Issue:** Payment API has no sandbox
Severity: high
The provider only offers production keys.
Suggestion: mock the client in tests
Workaround: use recorded fixtures
- Problem: README is outdated
";
        let hurdles = detect(text, "planning");
        assert_eq!(hurdles.len(), 2);

        assert_eq!(hurdles[0].issue, "Payment API has no sandbox");
        assert_eq!(hurdles[0].severity, Severity::High);
        assert_eq!(hurdles[0].context, "The provider only offers production keys.");
        assert_eq!(hurdles[0].suggestions.len(), 2);

        assert_eq!(hurdles[1].issue, "README is outdated");
        assert_eq!(hurdles[1].severity, Severity::Medium);
        assert!(!hurdles[1].resolved);
    }

    #[test]
    fn test_inline_severity_annotation() {
        let hurdles = detect("Risk: data loss on retry (severity: critical)", "build");
        assert_eq!(hurdles.len(), 1);
        assert_eq!(hurdles[0].issue, "data loss on retry");
        assert_eq!(hurdles[0].severity, Severity::Critical);
    }

    #[test]
    fn test_keyword_severity_on_issue_line() {
        let hurdles = detect("Challenge: low disk space on CI runners", "test");
        assert_eq!(hurdles[0].severity, Severity::Low);
    }

    #[test]
    fn test_unstructured_text_yields_single_medium_hurdle() {
        let text = "x".repeat(800);
        let hurdles = detect(&text, "review");
        assert_eq!(hurdles.len(), 1);
        assert_eq!(hurdles[0].issue, FALLBACK_ISSUE);
        assert_eq!(hurdles[0].severity, Severity::Medium);
        assert_eq!(hurdles[0].context.len(), FALLBACK_CONTEXT_CHARS);
        assert!(!should_escalate(&hurdles[0]));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(detect("", "plan").is_empty());
        assert!(detect("  \n\t", "plan").is_empty());
    }

    #[test]
    fn test_stray_severity_line_falls_back() {
        // a stray severity line is not an issue marker, so the fallback applies
        let hurdles = detect("Severity: critical", "plan");
        assert_eq!(hurdles.len(), 1);
        assert_eq!(hurdles[0].severity, Severity::Medium);
    }

    #[test]
    fn test_custom_marker() {
        let detector = HurdleDetector::default().with_issue_marker("Blocker:");
        let hurdles = detector.detect("blocker: vendor SDK missing", "plan");
        assert_eq!(hurdles[0].issue, "vendor SDK missing");
    }

    #[test]
    fn test_escalation_threshold() {
        assert!(should_escalate(&Hurdle::new("a", Severity::High)));
        assert!(should_escalate(&Hurdle::new("a", Severity::Critical)));
        assert!(!should_escalate(&Hurdle::new("a", Severity::Medium)));
    }
}
