//! Ledger transaction types.
//!
//! Every balance change is recorded as a `Transaction` in an append-only
//! ledger. Each entry snapshots the balance immediately before and after it,
//! so the ledger is auditable without replaying history. Completed entries
//! are immutable; corrections are new reversing entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pricing::CostBreakdown;
use crate::usage::TokenUsage;
use crate::{TransactionId, UserId};

/// A ledger entry representing one credit-affecting event.
///
/// Amounts are signed: positive = credit (allocation), negative = debit
/// (consumption). Transaction IDs are ULIDs, so entries sort by time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Signed credit quantity. Positive = credit, negative = debit.
    pub amount: f64,

    /// `available` immediately before this transaction.
    pub balance_before: f64,

    /// `available` immediately after this transaction.
    pub balance_after: f64,

    /// Lifecycle status of the entry.
    pub status: TransactionStatus,

    /// Human-readable description.
    pub description: String,

    /// Identifier of the operation that caused this entry (question ID,
    /// chat ID, ...), if any.
    pub reference_id: Option<String>,

    /// Kind of the referenced operation ("question", "chat", ...).
    pub reference_type: Option<String>,

    /// Client IP address at the time of the charge, if known.
    pub ip_address: Option<String>,

    /// Client user agent at the time of the charge, if known.
    pub user_agent: Option<String>,

    /// Free-form metadata.
    pub metadata: serde_json::Value,

    /// Input tokens consumed, for AI consumption entries.
    pub input_tokens: Option<u64>,

    /// Output tokens consumed, for AI consumption entries.
    pub output_tokens: Option<u64>,

    /// Total tokens consumed, for AI consumption entries.
    pub total_tokens: Option<u64>,

    /// AI model that produced the usage, for AI consumption entries.
    pub ai_model: Option<String>,

    /// Point-in-time cost computation trace. Freezes the rate that was
    /// applied, independent of later pricing edits.
    pub token_cost_breakdown: Option<CostBreakdown>,

    /// When this allocation ages out, for expiring allocations.
    pub expires_at: Option<DateTime<Utc>>,

    /// Back-reference for reversals and refunds.
    pub original_transaction_id: Option<TransactionId>,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new allocation (credit) transaction.
    #[must_use]
    pub fn allocation(
        user_id: UserId,
        transaction_type: TransactionType,
        amount: f64,
        balance_before: f64,
        description: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let amount = amount.abs();
        Self {
            id: TransactionId::generate(),
            user_id,
            transaction_type,
            amount,
            balance_before,
            balance_after: balance_before + amount,
            status: TransactionStatus::Completed,
            description,
            reference_id: None,
            reference_type: None,
            ip_address: None,
            user_agent: None,
            metadata: serde_json::Value::Null,
            input_tokens: None,
            output_tokens: None,
            total_tokens: None,
            ai_model: None,
            token_cost_breakdown: None,
            expires_at,
            original_transaction_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new consumption (debit) transaction for a settled AI
    /// operation.
    #[must_use]
    pub fn consumption(
        user_id: UserId,
        transaction_type: TransactionType,
        amount: f64,
        balance_before: f64,
        description: String,
        usage: &TokenUsage,
        breakdown: Option<CostBreakdown>,
    ) -> Self {
        let amount = amount.abs();
        Self {
            id: TransactionId::generate(),
            user_id,
            transaction_type,
            amount: -amount,
            balance_before,
            balance_after: balance_before - amount,
            status: TransactionStatus::Completed,
            description,
            reference_id: None,
            reference_type: None,
            ip_address: None,
            user_agent: None,
            metadata: serde_json::Value::Null,
            input_tokens: Some(usage.input_tokens),
            output_tokens: Some(usage.output_tokens),
            total_tokens: Some(usage.total_tokens),
            ai_model: breakdown.as_ref().map(|b| b.model.clone()),
            token_cost_breakdown: breakdown,
            expires_at: None,
            original_transaction_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create an expiration transaction sweeping aged-out credits.
    #[must_use]
    pub fn expiration(user_id: UserId, amount: f64, balance_before: f64) -> Self {
        let amount = amount.abs();
        Self {
            id: TransactionId::generate(),
            user_id,
            transaction_type: TransactionType::Expiration,
            amount: -amount,
            balance_before,
            balance_after: balance_before - amount,
            status: TransactionStatus::Completed,
            description: format!("Expired {amount} unused credits"),
            reference_id: None,
            reference_type: None,
            ip_address: None,
            user_agent: None,
            metadata: serde_json::Value::Null,
            input_tokens: None,
            output_tokens: None,
            total_tokens: None,
            ai_model: None,
            token_cost_breakdown: None,
            expires_at: None,
            original_transaction_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create a reversal of a completed transaction.
    ///
    /// The reversal carries the negated amount of the original and links back
    /// to it. The original entry is never updated in place.
    #[must_use]
    pub fn reversal(original: &Transaction, balance_before: f64, reason: String) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id: original.user_id,
            transaction_type: TransactionType::Refund,
            amount: -original.amount,
            balance_before,
            balance_after: balance_before - original.amount,
            status: TransactionStatus::Completed,
            description: reason,
            reference_id: original.reference_id.clone(),
            reference_type: original.reference_type.clone(),
            ip_address: None,
            user_agent: None,
            metadata: serde_json::Value::Null,
            input_tokens: None,
            output_tokens: None,
            total_tokens: None,
            ai_model: None,
            token_cost_breakdown: None,
            expires_at: None,
            original_transaction_id: Some(original.id),
            created_at: Utc::now(),
        }
    }

    /// Set the AI model recorded for the usage, when known independently of
    /// the cost breakdown (flat-rate charges carry none).
    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.ai_model = model.or(self.ai_model);
        self
    }

    /// Set the reference back to the operation that caused this entry.
    #[must_use]
    pub fn with_reference(
        mut self,
        reference_type: impl Into<String>,
        reference_id: impl Into<String>,
    ) -> Self {
        self.reference_type = Some(reference_type.into());
        self.reference_id = Some(reference_id.into());
        self
    }

    /// Set the client context captured at charge time.
    #[must_use]
    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    /// Set free-form metadata on the entry.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Initial or plan credit allocation.
    Allocation,
    /// Monthly renewal grant.
    Renewal,
    /// One-time purchased top-up.
    TopUp,
    /// Promotional credits.
    Promotional,
    /// Refund issued.
    Refund,
    /// Manual admin adjustment.
    AdminAdjustment,
    /// Signup bonus.
    SignupBonus,
    /// Referral bonus.
    ReferralBonus,
    /// AI question consumption.
    AiQuestion,
    /// AI chat consumption.
    AiChat,
    /// AI document analysis consumption.
    AiDocument,
    /// AI image generation consumption.
    AiImage,
    /// Advanced-model surcharge consumption.
    AdvancedModel,
    /// Generic feature usage consumption.
    FeatureUsage,
    /// Unused expiring credits swept to zero.
    Expiration,
    /// Credits removed on plan downgrade.
    Downgrade,
    /// Credits removed on cancellation.
    Cancellation,
}

impl TransactionType {
    /// Check if this transaction type adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(
            self,
            Self::Allocation
                | Self::Renewal
                | Self::TopUp
                | Self::Promotional
                | Self::Refund
                | Self::AdminAdjustment
                | Self::SignupBonus
                | Self::ReferralBonus
        )
    }

    /// Check if this transaction type removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        !self.is_credit()
    }

    /// Check if this transaction type is an AI-operation consumption.
    #[must_use]
    pub const fn is_consumption(&self) -> bool {
        matches!(
            self,
            Self::AiQuestion
                | Self::AiChat
                | Self::AiDocument
                | Self::AiImage
                | Self::AdvancedModel
                | Self::FeatureUsage
        )
    }
}

/// Lifecycle status of a ledger entry.
///
/// Once `Completed`, the amount and balance fields are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created but not yet applied.
    Pending,
    /// Applied to the balance. Immutable from here on.
    Completed,
    /// Application failed.
    Failed,
    /// Undone by a later reversing transaction.
    Reversed,
}
