//! Token cost estimates.

/// USD per one million tokens, `(input, output)`.
///
/// Checked in order, so the more specific tags come first.
const PRICING: &[(&str, f64, f64)] = &[
    ("gpt-4-turbo", 10.0, 30.0),
    ("gpt-4o", 10.0, 30.0),
    ("gpt-4", 30.0, 60.0),
    ("gpt-3.5", 0.5, 1.5),
];

/// Estimate the cost in USD of one call against `model`.
///
/// Unknown models cost nothing rather than guessing.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let model = model.to_lowercase();
    PRICING
        .iter()
        .find(|(tag, _, _)| model.contains(tag))
        .map(|(_, input, output)| {
            (input_tokens as f64 / 1_000_000.0) * input
                + (output_tokens as f64 / 1_000_000.0) * output
        })
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpt4_pricing() {
        let cost = estimate_cost("gpt-4", 1_000_000, 1_000_000);
        assert!((cost - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_turbo_matches_before_plain_gpt4() {
        let cost = estimate_cost("GPT-4-Turbo-Preview", 1_000_000, 0);
        assert!((cost - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_is_free() {
        assert_eq!(estimate_cost("local-llama", 5_000, 5_000), 0.0);
    }
}
