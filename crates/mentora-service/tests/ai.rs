//! Chargeable AI operation integration tests.

mod common;

use std::sync::Arc;

use common::{FailingAi, StubAi, TestHarness};
use serde_json::json;

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn rejects_unaffordable_operation_with_shortfall() {
    let harness = TestHarness::new();
    harness.allocate_credits(0.5).await;

    let response = harness
        .server
        .post("/v1/ai/question")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({"question": "What is photosynthesis?"}))
        .await;

    response.assert_status(axum::http::StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "INSUFFICIENT_CREDITS");
    // ai.question estimates 500 input + 500 output at default rates
    assert_eq!(body["data"]["required"], 2.0);
    assert_eq!(body["data"]["available"], 0.5);
    assert_eq!(body["data"]["shortfall"], 1.5);
    assert_eq!(body["data"]["estimatedTokens"], 1000);
}

#[tokio::test]
async fn rejects_user_with_no_balance_record() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/ai/question")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({"question": "hi"}))
        .await;

    response.assert_status(axum::http::StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["data"]["available"], 0.0);
}

#[tokio::test]
async fn unregistered_operation_runs_uncharged() {
    let harness = TestHarness::new();

    // No balance at all, but "ai.translate" has no cost requirement
    let response = harness
        .server
        .post("/v1/ai/translate")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({"text": "bonjour"}))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body.get("creditInfo").is_none());
}

#[tokio::test]
async fn anonymous_request_runs_uncharged() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/ai/question")
        .json(&json!({"question": "hi"}))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body.get("creditInfo").is_none());
}

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn charges_actual_usage_and_merges_credit_info() {
    let harness = TestHarness::new();
    harness.allocate_credits(100.0).await;

    let response = harness
        .server
        .post("/v1/ai/question")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({"question": "What is photosynthesis?"}))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    // Original response fields survive the merge
    assert!(body["answer"].as_str().unwrap().contains("Photosynthesis"));

    // Stub reports 2000 input + 1000 output on gpt-4o: 2.0 + 3.0 = 5.0
    assert_eq!(body["creditInfo"]["consumed"], 5.0);
    assert_eq!(body["creditInfo"]["remaining"], 95.0);
    assert_eq!(body["creditInfo"]["tokenUsage"]["inputTokens"], 2000);
    assert_eq!(body["creditInfo"]["tokenUsage"]["outputTokens"], 1000);
    assert_eq!(body["creditInfo"]["tokenUsage"]["totalTokens"], 3000);
    assert_eq!(body["creditInfo"]["tokenCostBreakdown"]["total_cost"], 5.0);

    // The charge is visible in the balance and ledger
    let balance: serde_json::Value = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(balance["available"], 95.0);
    assert_eq!(balance["total_consumed"], 5.0);

    let transactions: serde_json::Value = harness
        .server
        .get("/v1/credits/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    let newest = &transactions["transactions"][0];
    assert_eq!(newest["transaction_type"], "ai_question");
    assert_eq!(newest["amount"], -5.0);
    assert_eq!(newest["balance_before"], 100.0);
    assert_eq!(newest["balance_after"], 95.0);
    assert_eq!(newest["total_tokens"], 3000);
    assert_eq!(newest["ai_model"], "gpt-4o");
}

#[tokio::test]
async fn snake_case_usage_charges_identically() {
    let harness = TestHarness::with_ai(Arc::new(StubAi {
        response: json!({
            "answer": "ok",
            "usage": {
                "input_tokens": 2000,
                "output_tokens": 1000,
            },
            "model": "gpt-4o",
        }),
    }));
    harness.allocate_credits(100.0).await;

    let response = harness
        .server
        .post("/v1/ai/question")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({"question": "hi"}))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["creditInfo"]["consumed"], 5.0);
    assert_eq!(body["creditInfo"]["tokenUsage"]["totalTokens"], 3000);
}

#[tokio::test]
async fn missing_usage_charges_minimum() {
    let harness = TestHarness::with_ai(Arc::new(StubAi {
        response: json!({"answer": "ok"}),
    }));
    harness.allocate_credits(100.0).await;

    let response = harness
        .server
        .post("/v1/ai/question")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({"question": "hi"}))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["creditInfo"]["consumed"], 1.0);
    assert_eq!(body["creditInfo"]["remaining"], 99.0);
}

#[tokio::test]
async fn flat_rate_operation_charges_custom_amount() {
    let harness = TestHarness::new();
    harness.allocate_credits(100.0).await;

    let response = harness
        .server
        .post("/v1/ai/image")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({"prompt": "a fox"}))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["creditInfo"]["consumed"], 10.0);
    assert_eq!(body["creditInfo"]["remaining"], 90.0);
    // Flat charges carry no token cost breakdown
    assert!(body["creditInfo"].get("tokenCostBreakdown").is_none());

    // The reported model is still recorded on the ledger entry.
    let transactions: serde_json::Value = harness
        .server
        .get("/v1/credits/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(transactions["transactions"][0]["ai_model"], "gpt-4o");
}

#[tokio::test]
async fn body_supplied_user_id_is_charged() {
    let harness = TestHarness::new();
    harness.allocate_credits(100.0).await;

    // No auth header; the body names the user instead
    let response = harness
        .server
        .post("/v1/ai/question")
        .json(&json!({
            "question": "hi",
            "userId": harness.test_user_id.to_string(),
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["creditInfo"]["consumed"], 5.0);

    let balance: serde_json::Value = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(balance["available"], 95.0);
}

#[tokio::test]
async fn duplicate_reference_settles_once() {
    let harness = TestHarness::new();
    harness.allocate_credits(100.0).await;

    let request = json!({
        "question": "hi",
        "referenceId": "question-abc-123",
    });

    let first = harness
        .server
        .post("/v1/ai/question")
        .add_header("authorization", harness.user_auth_header())
        .json(&request)
        .await;
    first.assert_status_ok();
    let first_body: serde_json::Value = first.json();
    assert_eq!(first_body["creditInfo"]["consumed"], 5.0);

    // Replay with the same reference: delivered, but never charged again
    let second = harness
        .server
        .post("/v1/ai/question")
        .add_header("authorization", harness.user_auth_header())
        .json(&request)
        .await;
    second.assert_status_ok();
    let second_body: serde_json::Value = second.json();
    assert!(second_body.get("creditInfo").is_none());

    let balance: serde_json::Value = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(balance["available"], 95.0);
}

#[tokio::test]
async fn upstream_failure_is_never_charged() {
    let harness = TestHarness::with_ai(Arc::new(FailingAi));
    harness.allocate_credits(100.0).await;

    let response = harness
        .server
        .post("/v1/ai/question")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({"question": "hi"}))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);

    let balance: serde_json::Value = harness
        .server
        .get("/v1/credits/balance")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(balance["available"], 100.0);
    assert_eq!(balance["total_consumed"], 0.0);
}
