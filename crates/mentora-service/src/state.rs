//! Application state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use mentora_store::RocksStore;

use crate::config::ServiceConfig;

/// A black-box AI operation handler.
///
/// The credit pipeline makes no assumptions about what runs behind a
/// chargeable operation; it only wraps the invocation and inspects the
/// returned JSON body for token usage. Deployments wire a real upstream
/// here; tests inject stubs.
#[async_trait]
pub trait AiHandler: Send + Sync {
    /// Invoke the operation with the request body and produce a response
    /// body.
    async fn invoke(&self, operation: &str, request: &Value) -> Result<Value, AiHandlerError>;
}

/// Failure of the wrapped AI operation. No settlement is attempted for
/// failed operations.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct AiHandlerError(pub String);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// The wrapped AI operation handler.
    pub ai: Arc<dyn AiHandler>,
}

impl AppState {
    /// Create a new application state with the given AI handler.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig, ai: Arc<dyn AiHandler>) -> Self {
        Self { store, config, ai }
    }
}
