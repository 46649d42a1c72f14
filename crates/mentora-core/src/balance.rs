//! Per-user credit balance record.
//!
//! The balance is the only shared mutable resource in the credit pipeline.
//! It is mutated exclusively through ledger-writing store operations, never
//! directly by handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Durable per-user record of credit quantities.
///
/// Created lazily on the first credit-bearing event for a user. Invariant at
/// any consistent snapshot: `available == total_allocated - total_consumed`,
/// modulo pending expirations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// The user this balance belongs to.
    pub user_id: UserId,

    /// Credits currently spendable.
    pub available: f64,

    /// Lifetime credits allocated. Monotonically non-decreasing.
    pub total_allocated: f64,

    /// Lifetime credits consumed. Monotonically non-decreasing.
    pub total_consumed: f64,

    /// Portion of `available` that was purchased and never expires.
    pub purchased_credits: f64,

    /// Portion of `available` that ages out at `credits_expire_at`.
    pub expiring_credits: f64,

    /// When `expiring_credits` should be swept to zero, if ever.
    pub credits_expire_at: Option<DateTime<Utc>>,

    /// Threshold below which a one-time low-balance notification fires.
    pub low_credit_threshold: f64,

    /// Whether the low-balance notification has already fired.
    pub low_credit_notified: bool,

    /// When the balance record was created.
    pub created_at: DateTime<Utc>,

    /// When the balance record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Default low-credit warning threshold.
pub const DEFAULT_LOW_CREDIT_THRESHOLD: f64 = 5.0;

impl Balance {
    /// Create a new balance record with zero credits.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            available: 0.0,
            total_allocated: 0.0,
            total_consumed: 0.0,
            purchased_credits: 0.0,
            expiring_credits: 0.0,
            credits_expire_at: None,
            low_credit_threshold: DEFAULT_LOW_CREDIT_THRESHOLD,
            low_credit_notified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the balance can cover a deduction.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: f64) -> bool {
        self.available >= amount
    }

    /// Check whether the balance has dropped below the low-credit threshold
    /// and the one-shot notification has not fired yet.
    #[must_use]
    pub fn should_notify_low_credit(&self) -> bool {
        !self.low_credit_notified && self.available < self.low_credit_threshold
    }

    /// Check whether expiring credits have aged out as of `now`.
    #[must_use]
    pub fn has_expired_credits(&self, now: DateTime<Utc>) -> bool {
        self.expiring_credits > 0.0 && self.credits_expire_at.is_some_and(|at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_balance_is_zero() {
        let balance = Balance::new(UserId::generate());
        assert_eq!(balance.available, 0.0);
        assert_eq!(balance.total_allocated, 0.0);
        assert_eq!(balance.total_consumed, 0.0);
        assert!(!balance.low_credit_notified);
    }

    #[test]
    fn sufficiency_check() {
        let mut balance = Balance::new(UserId::generate());
        balance.available = 10.0;

        assert!(balance.has_sufficient_credits(5.0));
        assert!(balance.has_sufficient_credits(10.0));
        assert!(!balance.has_sufficient_credits(10.5));
    }

    #[test]
    fn low_credit_notification_is_one_shot() {
        let mut balance = Balance::new(UserId::generate());
        balance.available = 3.0;
        assert!(balance.should_notify_low_credit());

        balance.low_credit_notified = true;
        assert!(!balance.should_notify_low_credit());
    }

    #[test]
    fn expiry_check() {
        let mut balance = Balance::new(UserId::generate());
        let now = Utc::now();

        // No expiring credits, nothing to sweep
        assert!(!balance.has_expired_credits(now));

        balance.expiring_credits = 100.0;
        balance.credits_expire_at = Some(now + Duration::hours(1));
        assert!(!balance.has_expired_credits(now));

        balance.credits_expire_at = Some(now - Duration::hours(1));
        assert!(balance.has_expired_credits(now));
    }
}
