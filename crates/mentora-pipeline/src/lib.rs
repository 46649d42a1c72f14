//! Estimate-then-settle credit pipeline for AI operations.
//!
//! Two explicit stages wrap every chargeable operation:
//!
//! 1. **Authorization** (pre-flight, advisory): estimates the cost from the
//!    declared [`CostSchedule`] entry and the pricing table, and rejects
//!    requests that obviously cannot afford it. Read-only.
//! 2. **Settlement** (post-flight, authoritative): extracts actual token
//!    usage from the operation's response, computes the real cost, and
//!    applies the debit together with an append-only ledger entry in one
//!    atomic store write. Settlement failures are logged and absorbed; the
//!    already-delivered response is never rolled back.
//!
//! The stages are plain function calls around the handler invocation, with
//! the [`AuthDecision`] threaded explicitly between them — there is no
//! middleware magic and no ambient request state. [`run`] packages the full
//! authorize → invoke → settle sequence.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod authorize;
pub mod schedule;
pub mod settle;

pub use authorize::{authorize, AuthDecision, AuthError, ChargeContext, Identity};
pub use schedule::{CostRequirement, CostSchedule};
pub use settle::{settle, SettlementOutcome};

use std::future::Future;

use mentora_core::PricingConfig;
use mentora_store::Store;
use serde_json::Value;

/// One inbound chargeable request: operation identifier, resolved identity,
/// and the reference/client metadata recorded on the eventual ledger entry.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// Operation identifier looked up in the cost schedule.
    pub operation: String,
    /// How the requesting user was identified.
    pub identity: Identity,
    /// `(reference_type, reference_id)` of the underlying operation, used as
    /// the settlement idempotency key.
    pub reference: Option<(String, String)>,
    /// Client IP address.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
}

impl OperationRequest {
    /// Create a request with no reference or client metadata.
    #[must_use]
    pub fn new(operation: impl Into<String>, identity: Identity) -> Self {
        Self {
            operation: operation.into(),
            identity,
            reference: None,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Attach the operation reference used for settlement idempotency.
    #[must_use]
    pub fn with_reference(
        mut self,
        reference_type: impl Into<String>,
        reference_id: impl Into<String>,
    ) -> Self {
        self.reference = Some((reference_type.into(), reference_id.into()));
        self
    }

    /// Attach client request metadata.
    #[must_use]
    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// Errors from [`run`]. Only authorization rejections and handler failures
/// reach the caller; settlement problems never do.
#[derive(Debug, thiserror::Error)]
pub enum RunError<E> {
    /// The authorization stage rejected the request; the handler never ran.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The wrapped operation itself failed. No settlement was attempted —
    /// credits are only consumed on verified success.
    #[error("operation failed: {0}")]
    Handler(E),
}

/// Run the full pipeline around an operation handler:
/// `authorize` → invoke → `settle`.
///
/// Expired credits are swept before the affordability check so aged-out
/// allocations cannot pass it. Settlement runs unconditionally after a
/// successful invocation and its errors are absorbed (the returned outcome
/// is `None` when nothing was charged).
///
/// # Errors
///
/// `RunError::Auth` when authorization rejects; `RunError::Handler` when the
/// wrapped operation fails.
pub async fn run<S, F, Fut, E>(
    store: &S,
    pricing: &PricingConfig,
    schedule: &CostSchedule,
    request: &OperationRequest,
    handler: F,
) -> Result<(Value, Option<SettlementOutcome>), RunError<E>>
where
    S: Store + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, E>>,
{
    // Sweep is a mutation, so it runs as its own step ahead of the
    // read-only authorization stage.
    if let Some(user_id) = request.identity.user_id() {
        if let Err(err) = store.sweep_expired(&user_id, chrono::Utc::now()) {
            tracing::warn!(user_id = %user_id, error = %err, "Expiry sweep failed");
        }
    }

    let mut decision = authorize(
        store,
        pricing,
        schedule,
        &request.operation,
        &request.identity,
    )?;
    if let AuthDecision::Approved(ctx) = decision {
        decision = AuthDecision::Approved(
            ctx.with_client(request.ip_address.clone(), request.user_agent.clone()),
        );
    }

    let mut response = handler().await.map_err(RunError::Handler)?;

    let outcome = settle(
        store,
        pricing,
        &decision,
        &mut response,
        request
            .reference
            .as_ref()
            .map(|(t, i)| (t.as_str(), i.as_str())),
    );

    Ok((response, outcome))
}
