//! Post-flight settlement stage.
//!
//! Charges the real cost of a completed AI operation and records it in the
//! ledger. Settlement is authoritative: this is the only place balances are
//! mutated by the pipeline. Every settlement failure is absorbed here — the
//! user already received the operation's output, so billing problems are an
//! operational concern, never a user-facing one.

use mentora_core::usage::model_from_response;
use mentora_core::{CostBreakdown, PricingConfig, TokenUsage, TransactionId};
use mentora_store::{Debit, Store};
use serde_json::{json, Value};

use crate::authorize::AuthDecision;

/// What a successful settlement charged.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    /// ID of the ledger entry that was appended.
    pub transaction_id: TransactionId,
    /// Credits consumed.
    pub consumed: f64,
    /// Credits remaining after the charge.
    pub remaining: f64,
    /// Actual token usage that was charged.
    pub usage: TokenUsage,
    /// Cost computation trace, absent for flat-rate charges.
    pub breakdown: Option<CostBreakdown>,
}

/// Settle a completed AI operation.
///
/// Runs only for `Approved` decisions; `NotRequired` and `SkipCharge` are
/// no-ops. Extracts actual token usage and the model actually used from the
/// response body (falling back to authorization-time values), computes the
/// real cost with the same formula as authorization, and applies the debit
/// and ledger append as one atomic store write.
///
/// On success the response body gains a `creditInfo` field describing the
/// charge and the outcome is returned. On any failure — insufficient balance
/// at debit time, duplicate reference, store unavailable — the failure is
/// logged and `None` is returned; the response body is left unmodified. A
/// settlement failure must never fail or roll back the already-delivered
/// operation.
pub fn settle<S: Store + ?Sized>(
    store: &S,
    pricing: &PricingConfig,
    decision: &AuthDecision,
    response: &mut Value,
    reference: Option<(&str, &str)>,
) -> Option<SettlementOutcome> {
    let ctx = decision.context()?;

    // A missing or unparseable usage is not an error; the charge falls back
    // to the custom amount or the minimum floor.
    let usage = TokenUsage::from_response_or_zero(response);
    let model = model_from_response(response).or_else(|| ctx.model.clone());

    let (cost, breakdown) = match ctx.custom_amount {
        Some(amount) => (amount, None),
        None => {
            let breakdown = pricing.cost_for(model.as_deref(), &usage);
            (breakdown.total_cost, Some(breakdown))
        }
    };

    let debit = Debit {
        user_id: ctx.user_id,
        transaction_type: ctx.transaction_type,
        cost,
        description: describe(ctx.transaction_type, model.as_deref(), &usage),
        usage,
        model: model.clone(),
        breakdown,
        reference: reference.map(|(t, i)| (t.to_string(), i.to_string())),
        ip_address: ctx.ip_address.clone(),
        user_agent: ctx.user_agent.clone(),
        metadata: json!({
            "estimatedCost": ctx.estimated_cost,
            "jwtVerified": ctx.jwt_verified,
        }),
    };

    let (tx, balance) = match store.settle(&debit) {
        Ok(applied) => applied,
        Err(err) => {
            tracing::warn!(
                user_id = %ctx.user_id,
                cost,
                reference = ?reference,
                error = %err,
                "Settlement failed; response delivered uncharged"
            );
            return None;
        }
    };

    tracing::info!(
        user_id = %ctx.user_id,
        transaction_id = %tx.id,
        consumed = cost,
        remaining = balance.available,
        total_tokens = usage.total_tokens,
        "Settled AI operation"
    );

    let outcome = SettlementOutcome {
        transaction_id: tx.id,
        consumed: cost,
        remaining: balance.available,
        usage,
        breakdown: tx.token_cost_breakdown.clone(),
    };
    merge_credit_info(response, &outcome);

    Some(outcome)
}

/// Merge the `creditInfo` contract field into the outbound response body.
///
/// Non-object bodies are left as delivered; the caller still sees exactly
/// what the operation produced.
fn merge_credit_info(response: &mut Value, outcome: &SettlementOutcome) {
    let Some(body) = response.as_object_mut() else {
        return;
    };

    let mut credit_info = json!({
        "consumed": outcome.consumed,
        "remaining": outcome.remaining,
        "tokenUsage": {
            "inputTokens": outcome.usage.input_tokens,
            "outputTokens": outcome.usage.output_tokens,
            "totalTokens": outcome.usage.total_tokens,
        },
    });
    if let Some(breakdown) = &outcome.breakdown {
        if let Ok(value) = serde_json::to_value(breakdown) {
            credit_info["tokenCostBreakdown"] = value;
        }
    }

    body.insert("creditInfo".to_string(), credit_info);
}

fn describe(
    transaction_type: mentora_core::TransactionType,
    model: Option<&str>,
    usage: &TokenUsage,
) -> String {
    let model = model.unwrap_or("default");
    format!(
        "{transaction_type:?} on {model} ({} input, {} output tokens)",
        usage.input_tokens, usage.output_tokens
    )
}
