//! Mentora Service - HTTP API for credits and billing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mentora_service::{create_router, AiHandler, AiHandlerError, AppState, ServiceConfig};
use mentora_store::RocksStore;

/// Placeholder AI handler used until a real upstream is wired in.
///
/// Requests through `/v1/ai/*` fail upstream (never charged) with this
/// handler; credits and allocation endpoints are fully functional.
struct NoUpstream;

#[async_trait]
impl AiHandler for NoUpstream {
    async fn invoke(&self, operation: &str, _request: &Value) -> Result<Value, AiHandlerError> {
        Err(AiHandlerError(format!(
            "no AI upstream configured for {operation}"
        )))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mentora=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mentora Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        jwt_auth = %config.auth_secret.is_some(),
        service_auth = %config.service_api_key.is_some(),
        "Service configuration loaded"
    );
    if config.auth_secret.is_none() {
        tracing::warn!("AUTH_SECRET not set - accepting development test tokens only");
    }

    // Initialize RocksDB store
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    tracing::warn!("No AI upstream configured - /v1/ai/* operations will fail uncharged");
    let state = AppState::new(store, config.clone(), Arc::new(NoUpstream));

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
