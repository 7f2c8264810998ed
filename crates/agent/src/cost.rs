//! Token pricing.

use webrover_core::types::TokenUsage;

/// Per-call costs above this many USD are reported to the operator.
pub const COST_NOTICE_THRESHOLD: f64 = 0.09;

/// USD per 1K (prompt, completion) tokens, matched by model prefix in order.
const PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4-32k", 0.06, 0.12),
    ("gpt-4o-mini", 0.00015, 0.0006),
    ("gpt-4o", 0.005, 0.015),
    ("gpt-4", 0.03, 0.06),
    ("gpt-3.5-turbo-16k", 0.003, 0.004),
    ("gpt-3.5-turbo", 0.0015, 0.002),
];

/// Unknown models are free.
pub fn prices_per_1k(model: &str) -> (f64, f64) {
    let bare = model.rsplit('/').next().unwrap_or(model);
    PRICES
        .iter()
        .find(|(prefix, _, _)| bare.starts_with(prefix))
        .map(|(_, prompt, completion)| (*prompt, *completion))
        .unwrap_or((0.0, 0.0))
}

pub fn token_cost(usage: &TokenUsage, model: &str) -> f64 {
    let (prompt, completion) = prices_per_1k(model);
    usage.prompt_tokens as f64 * prompt / 1000.0 + usage.completion_tokens as f64 * completion / 1000.0
}

/// `Cost: +x USD (+n tokens)` when the call was expensive enough to mention.
pub fn call_cost_line(usage: &TokenUsage, model: &str) -> Option<String> {
    let cost = token_cost(usage, model);
    (cost > COST_NOTICE_THRESHOLD)
        .then(|| format!("Cost: +{:.2} USD (+{} tokens)", cost, usage.total_tokens))
}

pub fn current_cost_line(total: &TokenUsage, model: &str) -> String {
    format!("Current cost: {:.2} USD ({} tokens)", token_cost(total, model), total.total_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u64, completion: u64) -> TokenUsage {
        TokenUsage { prompt_tokens: prompt, completion_tokens: completion, total_tokens: prompt + completion }
    }

    #[test]
    fn test_prefix_order() {
        assert_eq!(prices_per_1k("gpt-4o-mini-2024-07-18"), (0.00015, 0.0006));
        assert_eq!(prices_per_1k("gpt-4o"), (0.005, 0.015));
        assert_eq!(prices_per_1k("gpt-4-32k-0613"), (0.06, 0.12));
        assert_eq!(prices_per_1k("gpt-4-0613"), (0.03, 0.06));
        assert_eq!(prices_per_1k("gpt-3.5-turbo-16k"), (0.003, 0.004));
        assert_eq!(prices_per_1k("openai/gpt-3.5-turbo"), (0.0015, 0.002));
        assert_eq!(prices_per_1k("llama3"), (0.0, 0.0));
    }

    #[test]
    fn test_cost_lines() {
        assert!(call_cost_line(&usage(2000, 0), "gpt-4").is_none());
        assert_eq!(
            call_cost_line(&usage(3000, 1000), "gpt-4").as_deref(),
            Some("Cost: +0.15 USD (+4000 tokens)")
        );
        assert_eq!(current_cost_line(&usage(1000, 500), "gpt-4"), "Current cost: 0.06 USD (1500 tokens)");
    }
}
