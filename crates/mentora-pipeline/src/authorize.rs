//! Pre-flight authorization stage.
//!
//! Decides, before an AI operation executes, whether the requesting user can
//! plausibly afford it. Advisory only: the stage is read-only against the
//! balance store and writes nothing to the ledger. The authoritative charge
//! happens in settlement.

use mentora_core::{PricingConfig, TokenUsage, TransactionType, UserId};
use mentora_store::Store;

use crate::schedule::CostSchedule;

/// How the requesting user was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// Authenticated via a verified JWT.
    Jwt(UserId),
    /// Self-reported in the request body, unverified.
    Claimed(UserId),
    /// No user resolvable. The request is allowed and never charged.
    Anonymous,
}

impl Identity {
    /// The resolved user ID, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Jwt(id) | Self::Claimed(id) => Some(*id),
            Self::Anonymous => None,
        }
    }

    /// Whether the identity came from a verified JWT rather than the body.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Jwt(_))
    }
}

/// Context attached to an approved request, threaded explicitly from
/// `authorize` to `settle`. Never ambient state.
#[derive(Debug, Clone)]
pub struct ChargeContext {
    /// The user who will be charged.
    pub user_id: UserId,
    /// Ledger transaction type declared for the operation.
    pub transaction_type: TransactionType,
    /// Estimated cost the affordability check used.
    pub estimated_cost: f64,
    /// `available` balance at authorization time (snapshot, advisory).
    pub balance_at_auth: f64,
    /// Token estimate the affordability check used.
    pub estimated_tokens: TokenUsage,
    /// Model declared for the operation, if any.
    pub model: Option<String>,
    /// Fixed charge to apply verbatim at settlement, if declared.
    pub custom_amount: Option<f64>,
    /// Whether the user was JWT-authenticated (vs body-supplied).
    pub jwt_verified: bool,
    /// Client IP address, recorded on the ledger entry.
    pub ip_address: Option<String>,
    /// Client user agent, recorded on the ledger entry.
    pub user_agent: Option<String>,
}

impl ChargeContext {
    /// Attach client request metadata for the eventual ledger entry.
    #[must_use]
    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Outcome of the authorization stage.
#[derive(Debug, Clone)]
pub enum AuthDecision {
    /// No cost requirement is declared for the operation. Allow; settlement
    /// is a no-op.
    NotRequired,
    /// No user was resolvable. Allow as a no-charge public request;
    /// authorization was skipped entirely, not merely defaulted.
    SkipCharge,
    /// The user can plausibly afford the operation; the context carries
    /// everything settlement needs.
    Approved(ChargeContext),
}

impl AuthDecision {
    /// The charge context, for approved decisions.
    #[must_use]
    pub const fn context(&self) -> Option<&ChargeContext> {
        match self {
            Self::Approved(ctx) => Some(ctx),
            Self::NotRequired | Self::SkipCharge => None,
        }
    }
}

/// Errors surfaced by the authorization stage.
///
/// These are the only pipeline errors that reach the caller; the operation
/// never runs when authorization rejects.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The user cannot afford the estimated cost. The fields are a contract
    /// consumed directly by the client billing UI.
    #[error("insufficient credits: required={required}, available={available}")]
    InsufficientCredits {
        /// Estimated cost of the operation.
        required: f64,
        /// Available balance at check time.
        available: f64,
        /// Exactly `required - available`.
        shortfall: f64,
        /// Total token estimate the check used.
        estimated_tokens: u64,
    },

    /// The balance store was unavailable.
    #[error(transparent)]
    Store(#[from] mentora_store::StoreError),
}

/// Run the pre-flight affordability check for an operation.
///
/// - No requirement declared for `operation` → `NotRequired` (allow
///   unconditionally).
/// - No resolvable user → `SkipCharge` (allow; the store is not consulted).
/// - Otherwise estimate the cost (`custom_amount` verbatim when declared,
///   else the pricing formula over the declared token estimate) and compare
///   against `available`. A missing balance record reads as zero.
///
/// # Errors
///
/// `AuthError::InsufficientCredits` when `available < estimated`, with the
/// exact shortfall; `AuthError::Store` when the balance read fails.
pub fn authorize<S: Store + ?Sized>(
    store: &S,
    pricing: &PricingConfig,
    schedule: &CostSchedule,
    operation: &str,
    identity: &Identity,
) -> Result<AuthDecision, AuthError> {
    let Some(requirement) = schedule.get(operation) else {
        return Ok(AuthDecision::NotRequired);
    };

    let Some(user_id) = identity.user_id() else {
        tracing::debug!(operation, "No resolvable user, skipping charge");
        return Ok(AuthDecision::SkipCharge);
    };

    let estimated_tokens = requirement.estimated_usage();
    let estimated_cost = match requirement.custom_amount {
        Some(amount) => amount,
        None => {
            pricing
                .cost_for(requirement.model.as_deref(), &estimated_tokens)
                .total_cost
        }
    };

    let available = store
        .get_balance(&user_id)?
        .map_or(0.0, |balance| balance.available);

    if available < estimated_cost {
        tracing::debug!(
            operation,
            user_id = %user_id,
            required = estimated_cost,
            available,
            "Authorization rejected: insufficient credits"
        );
        return Err(AuthError::InsufficientCredits {
            required: estimated_cost,
            available,
            shortfall: estimated_cost - available,
            estimated_tokens: estimated_tokens.total_tokens,
        });
    }

    Ok(AuthDecision::Approved(ChargeContext {
        user_id,
        transaction_type: requirement.transaction_type,
        estimated_cost,
        balance_at_auth: available,
        estimated_tokens,
        model: requirement.model.clone(),
        custom_amount: requirement.custom_amount,
        jwt_verified: identity.is_verified(),
        ip_address: None,
        user_agent: None,
    }))
}
