//! Mentora credits HTTP service.
//!
//! Exposes the credit pipeline over HTTP: balance and transaction history
//! for users, credit allocation for trusted services, and chargeable AI
//! operation endpoints wrapped by the authorize → invoke → settle pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::{AiHandler, AiHandlerError, AppState};
