//! Context budget management.
//!
//! Tracks how many tokens a payload costs against a [`ContextBudget`] and
//! reduces text to fit: plain truncation on token boundaries, or a
//! structure-preserving summary for source code.

pub mod tokenizer;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use tokenizer::{tokenizer_for, Cl100kTokenizer, LexicalTokenizer, Tokenizer};

/// Tokens held back for the model's answer unless configured otherwise.
pub const DEFAULT_RESERVED_TOKENS: usize = 4_000;

/// Usage ratio above which a request is summarised before planning.
pub const SUMMARIZE_ABOVE_PERCENT: f64 = 90.0;

/// How many leading characters are inspected to decide whether text is code.
const CODE_SNIFF_CHARS: usize = 500;

const CODE_INDICATORS: &[&str] = &[
    "fn ", "def ", "class ", "import ", "function ", "struct ", "{", "}", "()", "=>",
];

const DECLARATION_PREFIXES: &[&str] = &[
    "use ", "import ", "from ", "fn ", "pub ", "def ", "class ", "struct ", "enum ", "impl ",
    "impl<", "trait ", "mod ", "const ", "static ", "let ", "function ", "export ", "async ",
    "#[", "@",
];

const COMMENT_PREFIXES: &[&str] = &["//", "#", "/*", "*", "\"\"\"", "'''"];

const CONTROL_FLOW_WORDS: &[&str] = &[
    "if", "else", "for", "while", "match", "return", "raise", "assert", "try", "except",
];

/// Errors raised when building a budget.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("reserved tokens ({reserved}) must be smaller than max tokens ({max})")]
    ReservedExceedsMax { reserved: usize, max: usize },
}

/// Result type for context operations.
pub type ContextResult<T> = std::result::Result<T, ContextError>;

/// Token budget for one model. A configuration value, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub model_tag: String,
    pub max_tokens: usize,
    pub reserved_tokens: usize,
}

impl ContextBudget {
    pub fn new(
        model_tag: impl Into<String>,
        max_tokens: usize,
        reserved_tokens: usize,
    ) -> ContextResult<Self> {
        if reserved_tokens >= max_tokens {
            return Err(ContextError::ReservedExceedsMax {
                reserved: reserved_tokens,
                max: max_tokens,
            });
        }
        Ok(Self {
            model_tag: model_tag.into(),
            max_tokens,
            reserved_tokens,
        })
    }

    /// Default window for a model tag.
    pub fn for_model(model_tag: &str) -> Self {
        let tag = model_tag.to_lowercase();
        let max_tokens = if tag.contains("gpt-4") {
            100_000
        } else if tag.contains("gpt-3.5") {
            16_000
        } else {
            32_000
        };
        Self {
            model_tag: model_tag.to_string(),
            max_tokens,
            reserved_tokens: DEFAULT_RESERVED_TOKENS,
        }
    }

    /// Tokens available for input.
    pub fn max_input_tokens(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserved_tokens)
    }
}

/// Which end of the text is given up when truncating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Drop leading tokens, keep the end.
    Head,
    /// Drop trailing tokens, keep the beginning.
    Tail,
    /// Drop a centred window, keep both ends.
    Middle,
}

/// Result of [`ContextManager::check_usage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextUsage {
    pub total_tokens: usize,
    pub max_tokens: usize,
    pub usage_percent: f64,
    pub within_limit: bool,
    pub warning: bool,
}

/// Counts and reduces text against a budget.
#[derive(Clone)]
pub struct ContextManager {
    budget: ContextBudget,
    tokenizer: Arc<dyn Tokenizer>,
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("budget", &self.budget)
            .field("tokenizer", &self.tokenizer.name())
            .finish()
    }
}

impl ContextManager {
    /// Manager with the tokenizer matching the budget's model tag.
    pub fn new(budget: ContextBudget) -> Self {
        let tokenizer = tokenizer_for(&budget.model_tag);
        Self { budget, tokenizer }
    }

    pub fn with_tokenizer(budget: ContextBudget, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { budget, tokenizer }
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    pub fn tokenizer_name(&self) -> &'static str {
        self.tokenizer.name()
    }

    pub fn count(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    /// Reduce `text` to at most `limit` tokens.
    pub fn truncate_to_fit(
        &self,
        text: &str,
        limit: usize,
        strategy: TruncationStrategy,
    ) -> String {
        if self.count(text) <= limit {
            return text.to_string();
        }
        match strategy {
            TruncationStrategy::Tail => self.tokenizer.prefix(text, limit),
            TruncationStrategy::Head => self.tokenizer.suffix(text, limit),
            TruncationStrategy::Middle => self.truncate_middle(text, limit),
        }
    }

    fn truncate_middle(&self, text: &str, limit: usize) -> String {
        let mut front = limit.div_ceil(2);
        let mut back = limit - front;
        loop {
            let head = self.tokenizer.prefix(text, front);
            let tail = self.tokenizer.suffix(text, back);
            let joined = match (head.is_empty(), tail.is_empty()) {
                (true, true) => String::new(),
                (false, true) => head,
                (true, false) => tail,
                (false, false) => format!("{head}\n{tail}"),
            };
            if self.count(&joined) <= limit {
                return joined;
            }
            // Joining can merge tokens differently; give up one more from the back.
            if back > 0 {
                back -= 1;
            } else if front > 0 {
                front -= 1;
            } else {
                return String::new();
            }
        }
    }

    /// Shrink `text` to fit `limit` (default: a quarter of the input budget).
    ///
    /// Code keeps its declaration, comment and control-flow lines; prose is
    /// cut from the middle. The result never exceeds `limit` and never
    /// exceeds the token count of `text`.
    pub fn summarize_for_context(&self, text: &str, limit: Option<usize>) -> String {
        let limit = limit.unwrap_or(self.budget.max_input_tokens() / 4);
        let original = self.count(text);
        if original <= limit {
            return text.to_string();
        }

        if looks_like_code(text) {
            let kept: Vec<&str> = text.lines().filter(|l| is_structural_line(l)).collect();
            if !kept.is_empty() {
                let reduced = kept.join("\n");
                return self.truncate_to_fit(&reduced, limit, TruncationStrategy::Tail);
            }
        }
        self.truncate_to_fit(text, limit, TruncationStrategy::Middle)
    }

    /// Measure `texts` against the input budget. Pure: nothing is altered.
    pub fn check_usage(&self, texts: &[&str], warn_threshold: f64) -> ContextUsage {
        let total_tokens: usize = texts.iter().map(|t| self.count(t)).sum();
        let max_tokens = self.budget.max_input_tokens();
        let usage_percent = if max_tokens == 0 {
            if total_tokens == 0 {
                0.0
            } else {
                100.0
            }
        } else {
            total_tokens as f64 / max_tokens as f64 * 100.0
        };
        ContextUsage {
            total_tokens,
            max_tokens,
            usage_percent,
            within_limit: total_tokens <= max_tokens,
            warning: usage_percent >= warn_threshold * 100.0,
        }
    }

    /// Summarise a request that uses more than 90% of the input budget.
    ///
    /// Returns the (possibly reduced) text and whether it was reduced.
    pub fn fit_request(&self, text: &str, warn_threshold: f64) -> (String, bool) {
        let usage = self.check_usage(&[text], warn_threshold);
        if usage.warning && usage.usage_percent > SUMMARIZE_ABOVE_PERCENT {
            crate::obs::emit_context_overflow("request", usage.total_tokens, usage.max_tokens);
            let reduced =
                self.summarize_for_context(text, Some(self.budget.max_input_tokens() / 2));
            return (reduced, true);
        }
        (text.to_string(), false)
    }
}

/// Heuristic: does the beginning of `text` look like source code?
pub fn looks_like_code(text: &str) -> bool {
    let head: String = text.chars().take(CODE_SNIFF_CHARS).collect();
    CODE_INDICATORS.iter().any(|ind| head.contains(ind))
}

fn is_structural_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return false;
    }
    if DECLARATION_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        || COMMENT_PREFIXES.iter().any(|p| trimmed.starts_with(p))
    {
        return true;
    }
    trimmed
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|word| CONTROL_FLOW_WORDS.contains(&word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexical(max: usize) -> ContextManager {
        let budget = ContextBudget::new("test-model", max, 0).unwrap();
        ContextManager::with_tokenizer(budget, Arc::new(LexicalTokenizer))
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_budget_defaults_by_model() {
        assert_eq!(ContextBudget::for_model("gpt-4o").max_tokens, 100_000);
        assert_eq!(ContextBudget::for_model("gpt-3.5-turbo").max_tokens, 16_000);
        assert_eq!(ContextBudget::for_model("claude").max_tokens, 32_000);
        assert_eq!(ContextBudget::for_model("claude").max_input_tokens(), 28_000);
    }

    #[test]
    fn test_budget_rejects_reserved_over_max() {
        assert!(ContextBudget::new("m", 100, 100).is_err());
        assert!(ContextBudget::new("m", 100, 99).is_ok());
    }

    #[test]
    fn test_tail_keeps_prefix() {
        let cm = lexical(1_000);
        let text = words(50);
        let out = cm.truncate_to_fit(&text, 10, TruncationStrategy::Tail);
        assert_eq!(out, words(10));
    }

    #[test]
    fn test_head_keeps_suffix() {
        let cm = lexical(1_000);
        let text = words(50);
        let out = cm.truncate_to_fit(&text, 5, TruncationStrategy::Head);
        assert_eq!(out, "w45 w46 w47 w48 w49");
    }

    #[test]
    fn test_middle_keeps_both_ends() {
        let cm = lexical(1_000);
        let text = words(50);
        let out = cm.truncate_to_fit(&text, 4, TruncationStrategy::Middle);
        assert_eq!(out, "w0 w1\nw48 w49");
        assert_eq!(cm.count(&out), 4);
    }

    #[test]
    fn test_text_within_limit_is_untouched() {
        let cm = lexical(1_000);
        assert_eq!(cm.truncate_to_fit("a b c", 3, TruncationStrategy::Tail), "a b c");
    }

    #[test]
    fn test_code_summary_keeps_structure() {
        let cm = lexical(1_000);
        let code = "use std::fmt;\n\
                    // helper\n\
                    fn add(a: i32, b: i32) -> i32 {\n\
                    \x20   let total = a + b;\n\
                    \x20   println!(\"adding numbers to the total\");\n\
                    \x20   return total;\n\
                    }\n";
        let out = cm.summarize_for_context(code, Some(40));
        assert!(out.contains("use std::fmt;"));
        assert!(out.contains("fn add"));
        assert!(out.contains("return total;"));
        assert!(!out.contains("println!"));
        assert!(cm.count(&out) <= 40);
    }

    #[test]
    fn test_prose_summary_uses_middle() {
        let cm = lexical(1_000);
        let prose = words(100);
        let out = cm.summarize_for_context(&prose, Some(10));
        assert!(out.starts_with("w0 "));
        assert!(out.ends_with("w99"));
        assert!(cm.count(&out) <= 10);
    }

    #[test]
    fn test_check_usage_is_pure_read() {
        let cm = lexical(100);
        let a = words(30);
        let b = words(55);
        let usage = cm.check_usage(&[&a, &b], 0.8);
        assert_eq!(usage.total_tokens, 85);
        assert_eq!(usage.max_tokens, 100);
        assert!(usage.within_limit);
        assert!(usage.warning);
        assert_eq!(cm.count(&a), 30);
    }

    #[test]
    fn test_fit_request_summarises_only_above_ninety_percent() {
        let cm = lexical(100);
        let (same, reduced) = cm.fit_request(&words(85), 0.8);
        assert!(!reduced);
        assert_eq!(same, words(85));

        let (small, reduced) = cm.fit_request(&words(95), 0.8);
        assert!(reduced);
        assert!(cm.count(&small) <= 50);
    }
}
