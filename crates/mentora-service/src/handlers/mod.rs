//! HTTP request handlers.

pub mod ai;
pub mod credits;
pub mod health;
