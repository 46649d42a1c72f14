//! Pricing configuration for AI model usage.
//!
//! Cost is a pure function of `(model, input_tokens, output_tokens)`:
//!
//! ```text
//! cost = max(minimum_credits,
//!            model_multiplier * (input/1000 * input_cost_per_1k
//!                              + output/1000 * output_cost_per_1k))
//! ```
//!
//! Configuration is loaded once and treated as immutable for the duration of
//! a request; a concurrently-edited price takes effect on the next request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::usage::TokenUsage;

/// Per-model pricing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Credits per 1000 input tokens.
    pub input_cost_per_1k: f64,
    /// Credits per 1000 output tokens.
    pub output_cost_per_1k: f64,
    /// Floor applied to every charge for this model.
    pub minimum_credits: f64,
    /// Multiplier applied to the linear token cost (advanced models > 1).
    pub model_multiplier: f64,
}

impl ModelPricing {
    /// Compute the cost in credits for a token usage, with the minimum floor
    /// applied. Effective cost is never below `minimum_credits`.
    #[must_use]
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let linear = (usage.input_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (usage.output_tokens as f64 / 1000.0) * self.output_cost_per_1k;
        (self.model_multiplier * linear).max(self.minimum_credits)
    }
}

/// Pricing configuration for all known models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Pricing by model name.
    pub models: HashMap<String, ModelPricing>,

    /// Pricing used for unknown models and for requests that declare no
    /// model at all.
    pub default_pricing: ModelPricing,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let mut models = HashMap::new();

        models.insert(
            "gpt-4o".to_string(),
            ModelPricing {
                input_cost_per_1k: 1.0,
                output_cost_per_1k: 3.0,
                minimum_credits: 1.0,
                model_multiplier: 1.0,
            },
        );
        models.insert(
            "gpt-4o-mini".to_string(),
            ModelPricing {
                input_cost_per_1k: 0.1,
                output_cost_per_1k: 0.3,
                minimum_credits: 1.0,
                model_multiplier: 1.0,
            },
        );
        models.insert(
            "claude-3-5-sonnet".to_string(),
            ModelPricing {
                input_cost_per_1k: 1.2,
                output_cost_per_1k: 3.6,
                minimum_credits: 1.0,
                model_multiplier: 1.0,
            },
        );
        models.insert(
            "gpt-4-turbo".to_string(),
            ModelPricing {
                input_cost_per_1k: 2.0,
                output_cost_per_1k: 6.0,
                minimum_credits: 2.0,
                model_multiplier: 1.5,
            },
        );

        Self {
            models,
            default_pricing: ModelPricing {
                input_cost_per_1k: 1.0,
                output_cost_per_1k: 3.0,
                minimum_credits: 1.0,
                model_multiplier: 1.0,
            },
        }
    }
}

impl PricingConfig {
    /// Look up the pricing entry for a model, falling back to the default.
    #[must_use]
    pub fn pricing_for(&self, model: Option<&str>) -> &ModelPricing {
        model
            .and_then(|m| self.models.get(m))
            .unwrap_or(&self.default_pricing)
    }

    /// Compute the cost for a usage on a model, returning the full
    /// computation trace.
    #[must_use]
    pub fn cost_for(&self, model: Option<&str>, usage: &TokenUsage) -> CostBreakdown {
        let pricing = self.pricing_for(model);
        CostBreakdown::compute(model.unwrap_or("default"), pricing, usage)
    }
}

/// Point-in-time snapshot of a cost computation.
///
/// Stored on the ledger entry so the rate applied at settlement time is
/// frozen, independent of later pricing edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Model name the rate was resolved for.
    pub model: String,
    /// Input tokens charged.
    pub input_tokens: u64,
    /// Output tokens charged.
    pub output_tokens: u64,
    /// Linear cost of the input tokens, before multiplier and floor.
    pub input_cost: f64,
    /// Linear cost of the output tokens, before multiplier and floor.
    pub output_cost: f64,
    /// Multiplier that was applied.
    pub model_multiplier: f64,
    /// Floor that was applied.
    pub minimum_credits: f64,
    /// Final cost in credits.
    pub total_cost: f64,
}

impl CostBreakdown {
    /// Compute a breakdown for a usage under a pricing entry.
    #[must_use]
    pub fn compute(model: &str, pricing: &ModelPricing, usage: &TokenUsage) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let input_cost = (usage.input_tokens as f64 / 1000.0) * pricing.input_cost_per_1k;
        #[allow(clippy::cast_precision_loss)]
        let output_cost = (usage.output_tokens as f64 / 1000.0) * pricing.output_cost_per_1k;

        Self {
            model: model.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            input_cost,
            output_cost,
            model_multiplier: pricing.model_multiplier,
            minimum_credits: pricing.minimum_credits,
            total_cost: (pricing.model_multiplier * (input_cost + output_cost))
                .max(pricing.minimum_credits),
        }
    }
}
