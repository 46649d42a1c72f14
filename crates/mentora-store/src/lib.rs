//! `RocksDB` storage layer for Mentora credits.
//!
//! This crate is the sole authoritative mutator of balances. Every mutation
//! is expressed as inserting a ledger `Transaction` and updating the
//! `Balance` together, in one atomic write.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `balances`: Primary balance records, keyed by `user_id`
//! - `transactions`: Ledger entries, keyed by `transaction_id` (ULID)
//! - `transactions_by_user`: Index for listing transactions by user
//! - `settlements`: Idempotency markers, keyed by
//!   `(user_id, reference_type, reference_id)`
//!
//! # Example
//!
//! ```no_run
//! use mentora_store::{Credit, RocksStore, Store};
//! use mentora_core::{TransactionType, UserId};
//!
//! let store = RocksStore::open("/tmp/mentora-db").unwrap();
//!
//! let user_id = UserId::generate();
//! let (tx, balance) = store
//!     .allocate(&Credit {
//!         user_id,
//!         transaction_type: TransactionType::SignupBonus,
//!         amount: 50.0,
//!         description: "Signup bonus".into(),
//!         expires_at: None,
//!     })
//!     .unwrap();
//! assert_eq!(balance.available, tx.balance_after);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use mentora_core::{
    Balance, CostBreakdown, TokenUsage, Transaction, TransactionId, TransactionType, UserId,
};

/// A credit-side mutation request: add credits via a new ledger entry.
///
/// The store composes the `Transaction` itself so that `balance_before` and
/// `balance_after` are captured atomically with the balance update.
#[derive(Debug, Clone)]
pub struct Credit {
    /// The user to credit.
    pub user_id: UserId,
    /// Must be a credit-side transaction type.
    pub transaction_type: TransactionType,
    /// Credits to add (taken as absolute value).
    pub amount: f64,
    /// Human-readable description.
    pub description: String,
    /// When this allocation ages out, if it does.
    pub expires_at: Option<DateTime<Utc>>,
}

/// A debit-side mutation request: charge a completed AI operation.
#[derive(Debug, Clone)]
pub struct Debit {
    /// The user to charge.
    pub user_id: UserId,
    /// Must be a consumption transaction type.
    pub transaction_type: TransactionType,
    /// Credits to deduct (taken as absolute value).
    pub cost: f64,
    /// Human-readable description.
    pub description: String,
    /// Actual token usage being charged.
    pub usage: TokenUsage,
    /// AI model that produced the usage, when known. Recorded on the ledger
    /// entry even for flat-rate charges that carry no breakdown.
    pub model: Option<String>,
    /// Cost computation trace to freeze on the ledger entry.
    pub breakdown: Option<CostBreakdown>,
    /// `(reference_type, reference_id)` of the operation that caused the
    /// charge. When present, settlement is applied at most once per
    /// reference.
    pub reference: Option<(String, String)>,
    /// Client IP address at charge time.
    pub ip_address: Option<String>,
    /// Client user agent at charge time.
    pub user_agent: Option<String>,
    /// Free-form metadata for the ledger entry.
    pub metadata: serde_json::Value,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing different
/// implementations (`RocksDB`, failure-injecting stubs for tests).
pub trait Store: Send + Sync {
    // =========================================================================
    // Balance Operations
    // =========================================================================

    /// Insert or update a balance record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_balance(&self, balance: &Balance) -> Result<()>;

    /// Get a balance by user ID. `None` means no credit-bearing event has
    /// ever touched this user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_balance(&self, user_id: &UserId) -> Result<Option<Balance>>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// Get a ledger entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>>;

    /// List ledger entries for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    /// Check whether a settlement was already applied for a reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_settlement(
        &self,
        user_id: &UserId,
        reference_type: &str,
        reference_id: &str,
    ) -> Result<bool>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Add credits: append a ledger entry and update the balance atomically.
    ///
    /// Creates the balance record lazily if this is the user's first
    /// credit-bearing event. Returns the composed transaction and the
    /// balance after the write.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn allocate(&self, credit: &Credit) -> Result<(Transaction, Balance)>;

    /// Charge a completed AI operation: conditionally debit the balance and
    /// append the ledger entry in one atomic write.
    ///
    /// The debit is checked-and-applied inside one critical section: it
    /// fails with `InsufficientCredits` if `available < cost` at write time,
    /// and with `DuplicateSettlement` if the reference was already settled.
    /// A partial write (ledger entry without balance update, or vice versa)
    /// cannot occur. When the debit drops `available` below the low-credit
    /// threshold, the one-shot notification flag flips in the same write.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no balance record exists,
    /// `StoreError::InsufficientCredits` or `StoreError::DuplicateSettlement`
    /// as above, or a database error.
    fn settle(&self, debit: &Debit) -> Result<(Transaction, Balance)>;

    /// Sweep aged-out expiring credits, if any, via an `Expiration` ledger
    /// entry. Returns the sweep transaction when one was applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn sweep_expired(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>>;
}
