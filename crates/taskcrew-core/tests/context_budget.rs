use std::sync::Arc;

use taskcrew_core::context::LexicalTokenizer;
use taskcrew_core::{ContextBudget, ContextManager, TruncationStrategy};

fn manager(max_tokens: usize) -> ContextManager {
    let budget = ContextBudget::new("test-model", max_tokens, 0).unwrap();
    ContextManager::with_tokenizer(budget, Arc::new(LexicalTokenizer))
}

fn words(n: usize) -> String {
    (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
}

fn samples() -> Vec<String> {
    vec![
        String::new(),
        words(1),
        words(37),
        words(500),
        "fn main() {\n    let x = compute(1, 2);\n    if x > 3 { println!(\"{x}\"); }\n}\n".repeat(20),
        "Plain prose, with punctuation; and \u{00e9}l\u{00e8}ve unicode \u{00fc}ber words.\n".repeat(30),
        "a,b,c,d,e,f,g,h".repeat(40),
    ]
}

#[test]
fn tail_truncation_keeps_token_prefix() {
    let cm = manager(100);
    let text = words(500);
    assert_eq!(cm.count(&text), 500);

    let out = cm.truncate_to_fit(&text, 100, TruncationStrategy::Tail);
    assert!(cm.count(&out) <= 100);
    assert_eq!(out, words(100));
    assert!(text.starts_with(&out));
}

#[test]
fn head_truncation_keeps_token_suffix() {
    let cm = manager(100);
    let text = words(500);
    let out = cm.truncate_to_fit(&text, 10, TruncationStrategy::Head);
    assert_eq!(cm.count(&out), 10);
    assert!(text.ends_with(&out));
}

#[test]
fn truncation_never_exceeds_limit() {
    let cm = manager(10_000);
    for text in samples() {
        for limit in [0, 1, 2, 7, 50, 99, 1_000] {
            for strategy in [
                TruncationStrategy::Head,
                TruncationStrategy::Tail,
                TruncationStrategy::Middle,
            ] {
                let out = cm.truncate_to_fit(&text, limit, strategy);
                assert!(
                    cm.count(&out) <= limit,
                    "{strategy:?} limit {limit}: {} tokens",
                    cm.count(&out)
                );
            }
        }
    }
}

#[test]
fn summary_bounded_by_limit_and_input() {
    let cm = manager(10_000);
    for text in samples() {
        let original = cm.count(&text);
        for limit in [0, 3, 40, 200, 5_000] {
            let out = cm.summarize_for_context(&text, Some(limit));
            assert!(cm.count(&out) <= limit.min(original));
        }
    }
}

#[test]
fn code_summary_keeps_structure() {
    let cm = manager(10_000);
    let code = format!(
        "use std::io;\n\nfn main() {{\n{}    if ready() {{\n        return;\n    }}\n}}\n",
        "    value = value * 2 + offset - 1;\n".repeat(200)
    );
    let out = cm.summarize_for_context(&code, Some(30));
    assert!(out.starts_with("use std::io;"));
    assert!(out.contains("fn main()"));
    assert!(!out.contains("offset"));
}

#[test]
fn check_usage_is_pure() {
    let cm = manager(10);
    let a = words(6);
    let b = words(6);
    let usage = cm.check_usage(&[&a, &b], 0.8);
    assert_eq!(usage.total_tokens, 12);
    assert!(!usage.within_limit);
    assert!(usage.warning);
    assert_eq!(a, words(6));

    let small = cm.check_usage(&[&words(2)], 0.8);
    assert!(small.within_limit);
    assert!(!small.warning);
}

#[test]
fn oversized_request_is_summarised() {
    let cm = manager(100);
    let (fitted, reduced) = cm.fit_request(&words(95), 0.8);
    assert!(reduced);
    assert!(cm.count(&fitted) <= 50);

    let (kept, reduced) = cm.fit_request(&words(20), 0.8);
    assert!(!reduced);
    assert_eq!(kept, words(20));
}

#[test]
fn reserved_tokens_must_leave_room() {
    assert!(ContextBudget::new("m", 100, 100).is_err());
    assert_eq!(ContextBudget::new("m", 100, 40).unwrap().max_input_tokens(), 60);
}
