//! Credit balance, transaction history, and allocation handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mentora_core::{Transaction, TransactionStatus, TransactionType, UserId};
use mentora_store::{Credit, Store};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Credits currently spendable.
    pub available: f64,
    /// Lifetime credits allocated.
    pub total_allocated: f64,
    /// Lifetime credits consumed.
    pub total_consumed: f64,
    /// Purchased, non-expiring portion of `available`.
    pub purchased_credits: f64,
    /// Expiring portion of `available`.
    pub expiring_credits: f64,
    /// When the expiring portion ages out.
    pub credits_expire_at: Option<DateTime<Utc>>,
    /// Low-balance warning threshold.
    pub low_credit_threshold: f64,
}

/// Get current credit balance.
///
/// A user with no credit-bearing history reads as an all-zero balance; the
/// record itself is only created by the first allocation.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    // Sweep aged-out credits so the reported balance is spendable.
    state.store.sweep_expired(&auth.user_id, Utc::now())?;

    let balance = state.store.get_balance(&auth.user_id)?;
    let response = balance.map_or(
        BalanceResponse {
            available: 0.0,
            total_allocated: 0.0,
            total_consumed: 0.0,
            purchased_credits: 0.0,
            expiring_credits: 0.0,
            credits_expire_at: None,
            low_credit_threshold: mentora_core::balance::DEFAULT_LOW_CREDIT_THRESHOLD,
        },
        |b| BalanceResponse {
            available: b.available,
            total_allocated: b.total_allocated,
            total_consumed: b.total_consumed,
            purchased_credits: b.purchased_credits,
            expiring_credits: b.expiring_credits,
            credits_expire_at: b.credits_expire_at,
            low_credit_threshold: b.low_credit_threshold,
        },
    );

    Ok(Json(response))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Transaction type.
    pub transaction_type: TransactionType,
    /// Signed amount (positive = credit, negative = debit).
    pub amount: f64,
    /// Balance before this transaction.
    pub balance_before: f64,
    /// Balance after this transaction.
    pub balance_after: f64,
    /// Entry status.
    pub status: TransactionStatus,
    /// Description.
    pub description: String,
    /// Reference back to the causing operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
    /// Reference back to the causing operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// Total tokens, for AI consumption entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    /// Model, for AI consumption entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            balance_before: tx.balance_before,
            balance_after: tx.balance_after,
            status: tx.status,
            description: tx.description.clone(),
            reference_type: tx.reference_type.clone(),
            reference_id: tx.reference_id.clone(),
            total_tokens: tx.total_tokens,
            ai_model: tx.ai_model.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List transaction history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let transactions =
        state
            .store
            .list_transactions_by_user(&auth.user_id, limit + 1, query.offset)?;

    let has_more = transactions.len() > limit;
    let transactions: Vec<_> = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

/// Credit allocation request (service-to-service).
#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    /// User to credit.
    pub user_id: String,
    /// Credit-side transaction type.
    pub transaction_type: TransactionType,
    /// Credits to add.
    pub amount: f64,
    /// Optional description.
    pub description: Option<String>,
    /// When the allocation ages out, if it does.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Credit allocation response.
#[derive(Debug, Serialize)]
pub struct AllocateResponse {
    /// Ledger entry that was appended.
    pub transaction_id: String,
    /// Balance after the allocation.
    pub available: f64,
}

/// Allocate credits to a user.
///
/// Used by the subscription system for plan allocations and renewals, and
/// for admin adjustments, bonuses, and promotions.
pub async fn allocate(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<AllocateRequest>,
) -> Result<Json<AllocateResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    if !body.amount.is_finite() || body.amount <= 0.0 {
        return Err(ApiError::BadRequest(
            "Allocation amount must be positive".into(),
        ));
    }
    if !body.transaction_type.is_credit() {
        return Err(ApiError::BadRequest(format!(
            "{:?} is not a credit-side transaction type",
            body.transaction_type
        )));
    }

    let description = body.description.unwrap_or_else(|| {
        format!(
            "{:?} of {} credits via {}",
            body.transaction_type, body.amount, auth.service_name
        )
    });

    let (tx, balance) = state.store.allocate(&Credit {
        user_id,
        transaction_type: body.transaction_type,
        amount: body.amount,
        description,
        expires_at: body.expires_at,
    })?;

    tracing::info!(
        service = %auth.service_name,
        user_id = %user_id,
        amount = body.amount,
        available = balance.available,
        "Credits allocated"
    );

    Ok(Json(AllocateResponse {
        transaction_id: tx.id.to_string(),
        available: balance.available,
    }))
}
