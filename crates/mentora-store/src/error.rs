//! Error types for Mentora credit storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// Insufficient credits for the conditional debit.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Available balance at write time.
        available: f64,
        /// Required amount.
        required: f64,
    },

    /// A settlement for this reference was already applied.
    #[error("duplicate settlement: {reference_type}/{reference_id}")]
    DuplicateSettlement {
        /// Reference type of the duplicated settlement.
        reference_type: String,
        /// Reference ID of the duplicated settlement.
        reference_id: String,
    },

    /// The mutation request was malformed (e.g. a debit with a credit-side
    /// transaction type).
    #[error("invalid mutation: {0}")]
    InvalidMutation(String),
}
