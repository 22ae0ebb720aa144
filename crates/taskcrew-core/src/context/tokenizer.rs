//! Token counting backends.
//!
//! A [`Tokenizer`] must be deterministic and monotonic: appending text never
//! lowers the count. Truncation is expressed as prefix/suffix extraction so
//! every backend can guarantee its own limit.

use std::ops::Range;
use std::sync::{Arc, OnceLock};

use tiktoken_rs::CoreBPE;
use tracing::warn;

pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn count(&self, text: &str) -> usize;

    /// Longest prefix of `text` holding at most `limit` tokens.
    fn prefix(&self, text: &str, limit: usize) -> String;

    /// Longest suffix of `text` holding at most `limit` tokens.
    fn suffix(&self, text: &str, limit: usize) -> String;
}

/// Deterministic word/punctuation tokenizer.
///
/// A token is a maximal run of alphanumeric or `_` characters, or a single
/// other non-whitespace character. Whitespace is free, so any byte-substring
/// cut on token boundaries has exactly the expected count.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalTokenizer;

impl LexicalTokenizer {
    /// Byte ranges of every token in `text`.
    pub fn spans(text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut word_start: Option<usize> = None;

        for (idx, ch) in text.char_indices() {
            let is_word = ch.is_alphanumeric() || ch == '_';
            if is_word {
                if word_start.is_none() {
                    word_start = Some(idx);
                }
                continue;
            }
            if let Some(start) = word_start.take() {
                spans.push(start..idx);
            }
            if !ch.is_whitespace() {
                spans.push(idx..idx + ch.len_utf8());
            }
        }
        if let Some(start) = word_start {
            spans.push(start..text.len());
        }
        spans
    }
}

impl Tokenizer for LexicalTokenizer {
    fn name(&self) -> &'static str {
        "lexical"
    }

    fn count(&self, text: &str) -> usize {
        Self::spans(text).len()
    }

    fn prefix(&self, text: &str, limit: usize) -> String {
        let spans = Self::spans(text);
        if spans.len() <= limit {
            return text.to_string();
        }
        if limit == 0 {
            return String::new();
        }
        text[..spans[limit - 1].end].to_string()
    }

    fn suffix(&self, text: &str, limit: usize) -> String {
        let spans = Self::spans(text);
        if spans.len() <= limit {
            return text.to_string();
        }
        if limit == 0 {
            return String::new();
        }
        text[spans[spans.len() - limit].start..].to_string()
    }
}

/// BPE tokenizer matching OpenAI chat models (`cl100k_base`).
pub struct Cl100kTokenizer {
    bpe: &'static CoreBPE,
}

impl Cl100kTokenizer {
    /// Load the shared encoder, `None` if it cannot be constructed.
    pub fn load() -> Option<Self> {
        static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();
        BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(error = %e, "cl100k_base unavailable, falling back to lexical tokenizer");
                None
            }
        })
        .as_ref()
        .map(|bpe| Self { bpe })
    }

    /// Decode `tokens[range]`, shrinking the window until the decoded text
    /// is valid UTF-8 and re-encodes within `limit`.
    fn decode_within(&self, text: &str, limit: usize, from_end: bool) -> String {
        let tokens = self.bpe.encode_with_special_tokens(text);
        if tokens.len() <= limit {
            return text.to_string();
        }
        let mut keep = limit;
        while keep > 0 {
            let window = if from_end {
                tokens[tokens.len() - keep..].to_vec()
            } else {
                tokens[..keep].to_vec()
            };
            if let Ok(decoded) = self.bpe.decode(window) {
                if self.count(&decoded) <= limit {
                    return decoded;
                }
            }
            keep -= 1;
        }
        String::new()
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn name(&self) -> &'static str {
        "cl100k_base"
    }

    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn prefix(&self, text: &str, limit: usize) -> String {
        self.decode_within(text, limit, false)
    }

    fn suffix(&self, text: &str, limit: usize) -> String {
        self.decode_within(text, limit, true)
    }
}

/// Pick a tokenizer for a model tag.
///
/// OpenAI-style tags get `cl100k_base` when it loads; everything else uses
/// the lexical tokenizer.
pub fn tokenizer_for(model_tag: &str) -> Arc<dyn Tokenizer> {
    let tag = model_tag.to_lowercase();
    if tag.contains("gpt") {
        if let Some(t) = Cl100kTokenizer::load() {
            return Arc::new(t);
        }
    }
    Arc::new(LexicalTokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_counts_words_and_punctuation() {
        let t = LexicalTokenizer;
        assert_eq!(t.count(""), 0);
        assert_eq!(t.count("   "), 0);
        assert_eq!(t.count("fn main() {}"), 6);
        assert_eq!(t.count("snake_case words"), 2);
    }

    #[test]
    fn test_lexical_prefix_is_byte_prefix() {
        let t = LexicalTokenizer;
        let text = "alpha beta, gamma delta";
        let p = t.prefix(text, 3);
        assert_eq!(p, "alpha beta,");
        assert!(text.starts_with(&p));
        assert_eq!(t.count(&p), 3);
    }

    #[test]
    fn test_lexical_suffix_is_byte_suffix() {
        let t = LexicalTokenizer;
        let text = "alpha beta, gamma delta";
        let s = t.suffix(text, 2);
        assert_eq!(s, "gamma delta");
        assert!(text.ends_with(&s));
    }

    #[test]
    fn test_lexical_handles_multibyte() {
        let t = LexicalTokenizer;
        let text = "héllo € wörld ✓ done";
        assert_eq!(t.count(text), 5);
        assert_eq!(t.prefix(text, 2), "héllo €");
    }

    #[test]
    fn test_zero_limit_is_empty() {
        let t = LexicalTokenizer;
        assert_eq!(t.prefix("a b c", 0), "");
        assert_eq!(t.suffix("a b c", 0), "");
    }

    const MULTIBYTE: &str = "naïve café 日本語のテキスト 🚀 résumé Größe ✓ ";

    fn cl100k() -> Cl100kTokenizer {
        Cl100kTokenizer::load().expect("cl100k_base is bundled with tiktoken-rs")
    }

    #[test]
    fn test_cl100k_prefix_respects_limit() {
        let t = cl100k();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let p = t.prefix(&text, 17);
        assert!(!p.is_empty());
        assert!(t.count(&p) <= 17);
        assert!(text.starts_with(&p));
    }

    #[test]
    fn test_cl100k_bounds_hold_on_multibyte_text() {
        let t = cl100k();
        let text = MULTIBYTE.repeat(12);
        for limit in [1, 7, 23, 64] {
            let p = t.prefix(&text, limit);
            assert!(t.count(&p) <= limit, "prefix over {limit}");
            assert!(text.starts_with(&p));

            let s = t.suffix(&text, limit);
            assert!(t.count(&s) <= limit, "suffix over {limit}");
            assert!(text.ends_with(&s));
        }
        assert!(!t.suffix(&text, 23).is_empty());
    }

    #[test]
    fn test_cl100k_middle_truncation_keeps_both_ends() {
        let budget = crate::context::ContextBudget::new("gpt-4", 8192, 0).unwrap();
        let cm = crate::context::ContextManager::with_tokenizer(budget, Arc::new(cl100k()));
        let text = MULTIBYTE.repeat(12);
        let out = cm.truncate_to_fit(&text, 40, crate::context::TruncationStrategy::Middle);

        assert!(cm.count(&out) <= 40);
        let (head, tail) = out.split_once('\n').expect("both ends kept");
        assert!(!head.is_empty() && !tail.is_empty());
        assert!(text.starts_with(head));
        assert!(text.ends_with(tail));
    }

    #[test]
    fn test_unknown_model_uses_lexical() {
        assert_eq!(tokenizer_for("llama-3").name(), "lexical");
    }
}
