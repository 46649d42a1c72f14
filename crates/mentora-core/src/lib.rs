//! Core types for the Mentora credit pipeline.
//!
//! This crate provides the foundational types used throughout the Mentora
//! billing platform:
//!
//! - **Identifiers**: `UserId`, `TransactionId`
//! - **Balances**: `Balance`
//! - **Ledger**: `Transaction`, `TransactionType`, `TransactionStatus`
//! - **Pricing**: `PricingConfig`, `ModelPricing`, `CostBreakdown`
//! - **Token usage**: `TokenUsage`
//!
//! # Credits
//!
//! A credit is the platform's internal unit of consumption currency,
//! decremented per AI operation. Pricing rates are fractional per-1k-token
//! amounts, so credit quantities are stored as `f64`.
//!
//! The ledger is append-only: every balance change is a `Transaction`
//! capturing the balance immediately before and after, which makes the
//! history independently auditable without replaying it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod ids;
pub mod ledger;
pub mod pricing;
pub mod usage;

pub use balance::Balance;
pub use ids::{IdError, TransactionId, UserId};
pub use ledger::{Transaction, TransactionStatus, TransactionType};
pub use pricing::{CostBreakdown, ModelPricing, PricingConfig};
pub use usage::TokenUsage;
