//! Token usage extraction and normalization.
//!
//! AI operation handlers are black boxes; their responses may embed token
//! usage under one of several historically-used field conventions. This
//! module normalizes them with an ordered list of pure rules over the JSON
//! body, tried in sequence, returning the first match. No provider client
//! library is involved.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized token usage for one AI operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input (prompt) tokens.
    pub input_tokens: u64,
    /// Output (completion) tokens.
    pub output_tokens: u64,
    /// Total tokens. Derived as the sum when the response omits it.
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Create a usage with the total derived as the sum.
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Zero usage, used when a response carries no extractable counts.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Check whether any tokens were counted.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0 && self.total_tokens == 0
    }

    /// Extract token usage from an AI operation's response body.
    ///
    /// Rules are tried in order; the first shape that matches any field wins:
    ///
    /// 1. camelCase: `{inputTokens, outputTokens, totalTokens}`
    /// 2. snake_case: `{input_tokens, output_tokens, total_tokens}`
    ///
    /// Each rule also looks under a nested `usage`/`tokenUsage` object.
    /// Missing components default to zero and a missing total is derived as
    /// the sum. Returns `None` when no rule matches, in which case the
    /// settlement proceeds with zero usage.
    #[must_use]
    pub fn from_response(response: &Value) -> Option<Self> {
        for container in candidate_containers(response) {
            for rule in FIELD_RULES {
                if let Some(usage) = rule.extract(container) {
                    return Some(usage);
                }
            }
        }
        None
    }

    /// Extract from a response, defaulting to zero usage.
    #[must_use]
    pub fn from_response_or_zero(response: &Value) -> Self {
        Self::from_response(response).unwrap_or_else(Self::zero)
    }
}

/// Extract the AI model name actually used, from the response body.
///
/// Tries `aiModel`, then `model`, at the top level and under the same nested
/// containers as the token rules.
#[must_use]
pub fn model_from_response(response: &Value) -> Option<String> {
    for container in candidate_containers(response) {
        for field in ["aiModel", "model"] {
            if let Some(name) = container.get(field).and_then(Value::as_str) {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Containers searched for usage fields: the body itself, then any nested
/// usage object.
fn candidate_containers(response: &Value) -> impl Iterator<Item = &Value> {
    std::iter::once(response).chain(
        ["usage", "tokenUsage", "token_usage"]
            .into_iter()
            .filter_map(|k| response.get(k)),
    )
}

/// One field-naming convention for token counts.
struct FieldRule {
    input: &'static str,
    output: &'static str,
    total: &'static str,
}

/// Ordered normalization rules. The provider-agnostic camelCase shape is
/// checked before the underscored shape.
const FIELD_RULES: &[FieldRule] = &[
    FieldRule {
        input: "inputTokens",
        output: "outputTokens",
        total: "totalTokens",
    },
    FieldRule {
        input: "input_tokens",
        output: "output_tokens",
        total: "total_tokens",
    },
];

impl FieldRule {
    fn extract(&self, container: &Value) -> Option<TokenUsage> {
        let input = read_u64(container, self.input);
        let output = read_u64(container, self.output);
        let total = read_u64(container, self.total);

        if input.is_none() && output.is_none() && total.is_none() {
            return None;
        }

        let input_tokens = input.unwrap_or(0);
        let output_tokens = output.unwrap_or(0);
        Some(TokenUsage {
            input_tokens,
            output_tokens,
            total_tokens: total.unwrap_or(input_tokens + output_tokens),
        })
    }
}

fn read_u64(container: &Value, field: &str) -> Option<u64> {
    container.get(field).and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn camel_case_shape() {
        let body = json!({"answer": "hi", "inputTokens": 100, "outputTokens": 50});
        let usage = TokenUsage::from_response(&body).unwrap();
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 50);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn snake_case_shape_normalizes_identically() {
        let camel = json!({"inputTokens": 100, "outputTokens": 50});
        let snake = json!({"input_tokens": 100, "output_tokens": 50});
        assert_eq!(
            TokenUsage::from_response(&camel),
            TokenUsage::from_response(&snake)
        );
    }

    #[test]
    fn explicit_total_wins() {
        let body = json!({"inputTokens": 100, "outputTokens": 50, "totalTokens": 175});
        let usage = TokenUsage::from_response(&body).unwrap();
        assert_eq!(usage.total_tokens, 175);
    }

    #[test]
    fn missing_components_default_to_zero() {
        let body = json!({"outputTokens": 50});
        let usage = TokenUsage::from_response(&body).unwrap();
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.total_tokens, 50);
    }

    #[test]
    fn nested_usage_object() {
        let body = json!({"answer": "hi", "usage": {"input_tokens": 20, "output_tokens": 5}});
        let usage = TokenUsage::from_response(&body).unwrap();
        assert_eq!(usage.total_tokens, 25);
    }

    #[test]
    fn unparseable_body_yields_none() {
        assert!(TokenUsage::from_response(&json!({"answer": "hi"})).is_none());
        assert!(TokenUsage::from_response(&json!("just a string")).is_none());
        assert_eq!(
            TokenUsage::from_response_or_zero(&json!({"answer": "hi"})),
            TokenUsage::zero()
        );
    }

    #[test]
    fn model_extraction_order() {
        assert_eq!(
            model_from_response(&json!({"aiModel": "gpt-4o", "model": "other"})).as_deref(),
            Some("gpt-4o")
        );
        assert_eq!(
            model_from_response(&json!({"model": "gpt-4o-mini"})).as_deref(),
            Some("gpt-4o-mini")
        );
        assert_eq!(
            model_from_response(&json!({"usage": {"model": "nested"}})).as_deref(),
            Some("nested")
        );
        assert!(model_from_response(&json!({"answer": "hi"})).is_none());
    }
}
