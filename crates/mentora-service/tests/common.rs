//! Common test utilities for mentora-service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;

use mentora_core::UserId;
use mentora_service::{create_router, AiHandler, AiHandlerError, AppState, ServiceConfig};
use mentora_store::RocksStore;

/// Stub AI handler returning a fixed response body.
pub struct StubAi {
    pub response: Value,
}

#[async_trait]
impl AiHandler for StubAi {
    async fn invoke(&self, _operation: &str, _request: &Value) -> Result<Value, AiHandlerError> {
        Ok(self.response.clone())
    }
}

/// Stub AI handler that always fails upstream.
pub struct FailingAi;

#[async_trait]
impl AiHandler for FailingAi {
    async fn invoke(&self, operation: &str, _request: &Value) -> Result<Value, AiHandlerError> {
        Err(AiHandlerError(format!("{operation} unavailable")))
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database and an AI stub that
    /// answers with a typical token-bearing response body.
    pub fn new() -> Self {
        Self::with_ai(Arc::new(StubAi {
            response: json!({
                "answer": "Photosynthesis converts light into chemical energy.",
                "usage": {
                    "inputTokens": 2000,
                    "outputTokens": 1000,
                    "totalTokens": 3000,
                },
                "aiModel": "gpt-4o",
            }),
        }))
    }

    /// Create a test harness around a specific AI handler.
    pub fn with_ai(ai: Arc<dyn AiHandler>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let service_api_key = "test-service-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_secret: None,
            service_api_key: Some(service_api_key.clone()),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            pricing: mentora_core::PricingConfig::default(),
            schedule: mentora_pipeline::CostSchedule::standard(),
        };

        let state = AppState::new(Arc::new(store), config, ai);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let test_user_id = UserId::generate();

        Self {
            server,
            _temp_dir: temp_dir,
            test_user_id,
            service_api_key,
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header() -> String {
        let other_user = UserId::generate();
        format!("Bearer test-token:{other_user}")
    }

    /// Allocate credits to the test user through the service endpoint.
    pub async fn allocate_credits(&self, amount: f64) {
        let response = self
            .server
            .post("/v1/credits/allocate")
            .add_header("x-api-key", self.service_api_key.clone())
            .add_header("x-service-name", "test-suite")
            .json(&json!({
                "user_id": self.test_user_id.to_string(),
                "transaction_type": "allocation",
                "amount": amount,
            }))
            .await;
        response.assert_status_ok();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
