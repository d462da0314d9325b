//! Per-model USD pricing used by the cost ledger.
//!
//! Rates are USD per million tokens. Unknown models fall back to a
//! conservative default so budget enforcement never silently treats a
//! call as free.

use nexus_domain::stream::TokenUsage;

#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input_per_mtok: 5.0,
    output_per_mtok: 15.0,
};

/// Look up pricing for a model by prefix match.
pub fn pricing_for(model: &str) -> ModelPricing {
    const TABLE: &[(&str, ModelPricing)] = &[
        ("claude-opus", ModelPricing { input_per_mtok: 15.0, output_per_mtok: 75.0 }),
        ("claude-sonnet", ModelPricing { input_per_mtok: 3.0, output_per_mtok: 15.0 }),
        ("claude-haiku", ModelPricing { input_per_mtok: 0.8, output_per_mtok: 4.0 }),
        ("claude-3-5-haiku", ModelPricing { input_per_mtok: 0.8, output_per_mtok: 4.0 }),
        ("gpt-4o-mini", ModelPricing { input_per_mtok: 0.15, output_per_mtok: 0.6 }),
        ("gpt-4o", ModelPricing { input_per_mtok: 2.5, output_per_mtok: 10.0 }),
        ("gpt-4.1", ModelPricing { input_per_mtok: 2.0, output_per_mtok: 8.0 }),
    ];

    for (prefix, pricing) in TABLE {
        if model.starts_with(prefix) {
            return *pricing;
        }
    }
    DEFAULT_PRICING
}

/// Estimate the USD cost of a completed call.
pub fn estimate_cost(model: &str, usage: &TokenUsage) -> f64 {
    let p = pricing_for(model);
    (usage.input_tokens as f64 / 1_000_000.0) * p.input_per_mtok
        + (usage.output_tokens as f64 / 1_000_000.0) * p.output_per_mtok
}

/// Estimate the USD cost of a planned call from its input-token estimate.
/// Used by the budget precheck before any tokens are spent.
pub fn estimate_planned_cost(model: &str, planned_input_tokens: u32) -> f64 {
    let p = pricing_for(model);
    (planned_input_tokens as f64 / 1_000_000.0) * p.input_per_mtok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_match_by_prefix() {
        let sonnet = pricing_for("claude-sonnet-4-20250514");
        assert_eq!(sonnet.input_per_mtok, 3.0);
        let mini = pricing_for("gpt-4o-mini-2024-07-18");
        assert_eq!(mini.output_per_mtok, 0.6);
    }

    #[test]
    fn unknown_model_uses_default() {
        let p = pricing_for("some-new-model");
        assert_eq!(p.input_per_mtok, DEFAULT_PRICING.input_per_mtok);
    }

    #[test]
    fn cost_math() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            cache_read_tokens: None,
            cache_write_tokens: None,
        };
        let cost = estimate_cost("claude-sonnet-4-20250514", &usage);
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn mini_model_ordering_matters() {
        // "gpt-4o-mini" must match before the "gpt-4o" prefix.
        let p = pricing_for("gpt-4o-mini");
        assert_eq!(p.input_per_mtok, 0.15);
    }
}
