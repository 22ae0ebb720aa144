//! Hurdle severity levels.

use serde::{Deserialize, Serialize};

/// How serious a detected hurdle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Whether a hurdle at this level must pass an approval gate.
    pub fn requires_escalation(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Parse a level name (`"high"`, `"Critical"`, ...).
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "low" | "minor" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" | "major" => Some(Self::High),
            "critical" | "blocker" => Some(Self::Critical),
            _ => None,
        }
    }

    /// The most severe level named as a word in `line`.
    pub fn from_keywords(line: &str) -> Option<Self> {
        let lowered = line.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        [Self::Critical, Self::High, Self::Medium, Self::Low]
            .into_iter()
            .find(|s| words.contains(&s.to_string().as_str()))
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_requires_escalation() {
        assert!(!Severity::Low.requires_escalation());
        assert!(!Severity::Medium.requires_escalation());
        assert!(Severity::High.requires_escalation());
        assert!(Severity::Critical.requires_escalation());
    }

    #[test]
    fn test_keywords_prefer_most_severe() {
        assert_eq!(
            Severity::from_keywords("low effort but critical impact"),
            Some(Severity::Critical)
        );
        assert_eq!(Severity::from_keywords("nothing here"), None);
        assert_eq!(Severity::from_keywords("follow the highlighted path"), None);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Severity::parse(" Major "), Some(Severity::High));
        assert_eq!(Severity::parse("unknown"), None);
    }
}
