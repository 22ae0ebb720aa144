//! Parsers for the structured bits of role output.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::collaborators::{Artifact, MergeMethod};

const TITLE_LIMIT: usize = 100;
const DEFAULT_TITLE: &str = "Project Implementation";

const PASS_INDICATORS: &[&str] = &[
    "all tests passed",
    "tests passed",
    "passed:",
    "\u{2713}",
    "\u{2705}",
];
const FAIL_INDICATORS: &[&str] = &[
    "tests failed",
    "failed:",
    "error:",
    "failure",
    "\u{274c}",
    "\u{2717}",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeVerdict {
    Approved,
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub verdict: MergeVerdict,
    pub method: MergeMethod,
    pub commit_message: Option<String>,
    /// Whether an explicit `DECISION:` token was present.
    pub explicit: bool,
}

impl MergeDecision {
    pub fn is_approved(&self) -> bool {
        self.verdict == MergeVerdict::Approved
    }
}

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn decision_token() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"(?im)^[\s*#>\-]*decision\s*[:=]\s*[*`]*\s*(approved|not_ready)\b")
}

fn method_token() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached(&RE, r"(?i)merge\s+method[^:\n]*[:=]\s*[*`]*\s*(squash|rebase|merge)\b")
}

/// Read the integrator's merge decision.
///
/// An explicit `DECISION: APPROVED` / `DECISION: NOT_READY` line wins.
/// Without one, the text approves only if it says "approved" and "merge"
/// and never "not_ready".
pub fn parse_merge_decision(text: &str) -> MergeDecision {
    let lowered = text.to_lowercase();
    let explicit = decision_token()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase());

    let verdict = match explicit.as_deref() {
        Some("approved") => MergeVerdict::Approved,
        Some(_) => MergeVerdict::NotReady,
        None => {
            if lowered.contains("approved")
                && lowered.contains("merge")
                && !lowered.contains("not_ready")
            {
                MergeVerdict::Approved
            } else {
                MergeVerdict::NotReady
            }
        }
    };

    MergeDecision {
        verdict,
        method: parse_merge_method(text),
        commit_message: parse_commit_message(text),
        explicit: explicit.is_some(),
    }
}

fn parse_merge_method(text: &str) -> MergeMethod {
    if let Some(method) = method_token()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .and_then(|m| MergeMethod::parse(m.as_str()))
    {
        return method;
    }
    let lowered = text.to_lowercase();
    if lowered.contains("rebase") && !lowered.contains("squash") {
        MergeMethod::Rebase
    } else {
        MergeMethod::Squash
    }
}

/// The text after `commit message:`, or the next non-empty line.
fn parse_commit_message(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let idx = lines
        .iter()
        .position(|l| l.to_lowercase().contains("commit message"))?;
    let line = lines[idx];
    let inline = line
        .split_once(':')
        .map(|(_, rest)| clean_value(rest))
        .filter(|s| !s.is_empty());
    inline.or_else(|| {
        lines[idx + 1..]
            .iter()
            .map(|l| clean_value(l))
            .find(|l| !l.is_empty())
    })
}

fn clean_value(s: &str) -> String {
    s.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '*')
        .trim()
        .to_string()
}

/// Title and body for an integration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationInfo {
    pub title: String,
    pub body: String,
}

/// Accepts JSON `{title, body}`, then `Title:` / `Description:` (or
/// `Body:`) lines; otherwise the first line becomes the title.
pub fn parse_integration_info(text: &str) -> IntegrationInfo {
    if let Ok(info) = serde_json::from_str::<IntegrationInfo>(text.trim()) {
        return info;
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut title = None;
    let mut body = None;
    for (i, line) in lines.iter().enumerate() {
        let lowered = line.to_lowercase();
        if title.is_none() && lowered.contains("title") && line.contains(':') {
            title = line
                .split_once(':')
                .map(|(_, rest)| clean_value(rest))
                .filter(|t| !t.is_empty());
        } else if lowered.contains("description") || lowered.contains("body") {
            let inline = line
                .split_once(':')
                .map(|(_, rest)| rest.trim())
                .unwrap_or_default();
            let mut parts: Vec<&str> = Vec::new();
            if !inline.is_empty() {
                parts.push(inline);
            }
            parts.extend(lines[i + 1..].iter().copied());
            body = Some(parts.join("\n").trim().to_string());
            break;
        }
    }

    let title = title.unwrap_or_else(|| {
        let first = lines.iter().map(|l| l.trim()).find(|l| !l.is_empty());
        match first {
            Some(line) if line.chars().count() > TITLE_LIMIT => {
                let head: String = line.chars().take(TITLE_LIMIT - 3).collect();
                format!("{head}...")
            }
            Some(line) => line.to_string(),
            None => DEFAULT_TITLE.to_string(),
        }
    });
    let body = body
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| text.trim().to_string());
    IntegrationInfo { title, body }
}

/// Whether test output reports success.
///
/// Only a fail indicator without any pass indicator counts as failure;
/// ambiguous output counts as passing.
pub fn parse_tests_passed(text: &str) -> bool {
    let lowered = text.to_lowercase();
    let has_pass = PASS_INDICATORS.iter().any(|i| lowered.contains(i));
    let has_fail = FAIL_INDICATORS.iter().any(|i| lowered.contains(i));
    !(has_fail && !has_pass)
}

/// Fenced blocks headed ```` ```lang:path ````.
pub fn extract_artifacts(text: &str) -> Vec<Artifact> {
    let mut artifacts = Vec::new();
    let mut open: Option<(String, Vec<&str>)> = None;
    let mut in_anonymous = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix("```") {
            if let Some((path, body)) = open.take() {
                let mut content = body.join("\n");
                content.push('\n');
                artifacts.push(Artifact::new(path, content));
                continue;
            }
            if in_anonymous {
                in_anonymous = false;
                continue;
            }
            match header.split_once(':').map(|(_, p)| p.trim()) {
                Some(path) if !path.is_empty() => open = Some((path.to_string(), Vec::new())),
                _ => in_anonymous = true,
            }
            continue;
        }
        if let Some((_, body)) = open.as_mut() {
            body.push(line);
        }
    }
    artifacts
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationStats {
    /// Fenced blocks carrying a path header.
    pub file_count: usize,
    pub loc: usize,
}

pub fn implementation_stats(text: &str) -> ImplementationStats {
    ImplementationStats {
        file_count: extract_artifacts(text).len(),
        loc: text.lines().count(),
    }
}

/// Code-quality figures found in a review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityFigures {
    pub dry_violations: Option<u32>,
    pub complexity: Option<f64>,
    pub readability: Option<f64>,
    pub maintainability: Option<f64>,
}

fn figure(label: &str, text: &str) -> Option<f64> {
    let re = Regex::new(&format!(r"(?i){label}\s*[:=]\s*\**\s*([0-9]+(?:\.[0-9]+)?)")).ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

pub fn parse_quality_figures(text: &str) -> Option<QualityFigures> {
    let figures = QualityFigures {
        dry_violations: figure(r"dry\s+violations", text).map(|v| v as u32),
        complexity: figure("complexity", text),
        readability: figure("readability", text),
        maintainability: figure("maintainability", text),
    };
    let any = figures.dry_violations.is_some()
        || figures.complexity.is_some()
        || figures.readability.is_some()
        || figures.maintainability.is_some();
    any.then_some(figures)
}
