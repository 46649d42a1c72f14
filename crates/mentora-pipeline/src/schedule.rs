//! Cost requirement declarations for chargeable operations.
//!
//! Operations declare their cost requirement in an explicit registration
//! table consulted directly by the authorization stage. An operation with no
//! entry in the table is not charged at all.

use std::collections::HashMap;

use mentora_core::{TokenUsage, TransactionType};

/// Declared cost requirement for one operation.
#[derive(Debug, Clone)]
pub struct CostRequirement {
    /// Ledger transaction type recorded for this operation.
    pub transaction_type: TransactionType,

    /// Fixed charge used verbatim instead of the token-pricing formula.
    pub custom_amount: Option<f64>,

    /// Model the operation is expected to run on, used for the estimate and
    /// as the fallback when the response names no model.
    pub model: Option<String>,

    /// Token estimate used for the pre-flight affordability check.
    pub estimated_input_tokens: u64,

    /// Token estimate used for the pre-flight affordability check.
    pub estimated_output_tokens: u64,
}

impl CostRequirement {
    /// Create a token-priced requirement with a fixed estimate heuristic.
    #[must_use]
    pub fn metered(
        transaction_type: TransactionType,
        model: Option<String>,
        estimated_input_tokens: u64,
        estimated_output_tokens: u64,
    ) -> Self {
        Self {
            transaction_type,
            custom_amount: None,
            model,
            estimated_input_tokens,
            estimated_output_tokens,
        }
    }

    /// Create a flat-rate requirement charged verbatim.
    #[must_use]
    pub fn flat(transaction_type: TransactionType, amount: f64) -> Self {
        Self {
            transaction_type,
            custom_amount: Some(amount),
            model: None,
            estimated_input_tokens: 0,
            estimated_output_tokens: 0,
        }
    }

    /// The token estimate as a usage value.
    #[must_use]
    pub const fn estimated_usage(&self) -> TokenUsage {
        TokenUsage::new(self.estimated_input_tokens, self.estimated_output_tokens)
    }
}

/// Registration table mapping operation identifiers to cost requirements.
#[derive(Debug, Clone, Default)]
pub struct CostSchedule {
    operations: HashMap<String, CostRequirement>,
}

impl CostSchedule {
    /// Create an empty schedule. Every operation is free until registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cost requirement for an operation identifier.
    pub fn register(&mut self, operation: impl Into<String>, requirement: CostRequirement) {
        self.operations.insert(operation.into(), requirement);
    }

    /// Look up the requirement declared for an operation, if any.
    #[must_use]
    pub fn get(&self, operation: &str) -> Option<&CostRequirement> {
        self.operations.get(operation)
    }

    /// The standard schedule for the tutoring platform's AI operations.
    #[must_use]
    pub fn standard() -> Self {
        let mut schedule = Self::new();
        schedule.register(
            "ai.question",
            CostRequirement::metered(TransactionType::AiQuestion, None, 500, 500),
        );
        schedule.register(
            "ai.chat",
            CostRequirement::metered(TransactionType::AiChat, None, 1000, 1000),
        );
        schedule.register(
            "ai.document",
            CostRequirement::metered(TransactionType::AiDocument, None, 4000, 1000),
        );
        schedule.register(
            "ai.image",
            CostRequirement::flat(TransactionType::AiImage, 10.0),
        );
        schedule.register(
            "ai.advanced",
            CostRequirement::metered(
                TransactionType::AdvancedModel,
                Some("gpt-4-turbo".to_string()),
                1000,
                1000,
            ),
        );
        schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_operation_is_free() {
        let schedule = CostSchedule::standard();
        assert!(schedule.get("cms.list_blogs").is_none());
    }

    #[test]
    fn registered_operation_carries_estimate() {
        let schedule = CostSchedule::standard();
        let req = schedule.get("ai.question").unwrap();
        assert_eq!(req.transaction_type, TransactionType::AiQuestion);
        assert_eq!(req.estimated_usage().total_tokens, 1000);
        assert!(req.custom_amount.is_none());
    }

    #[test]
    fn flat_requirement_skips_estimation() {
        let schedule = CostSchedule::standard();
        let req = schedule.get("ai.image").unwrap();
        assert_eq!(req.custom_amount, Some(10.0));
        assert!(req.estimated_usage().is_zero());
    }
}
