//! Chargeable AI operation endpoints.
//!
//! `POST /v1/ai/{operation}` wraps the black-box AI handler with the credit
//! pipeline: authorize, invoke, settle. The operation identifier is looked
//! up in the cost schedule as `ai.{operation}`; operations with no schedule
//! entry run uncharged.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use mentora_pipeline::{Identity, OperationRequest, RunError};

use crate::auth::MaybeAuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Invoke a chargeable AI operation.
///
/// Identity resolution order: verified JWT, then a body-supplied `userId`,
/// then anonymous (allowed, never charged). A body-supplied `referenceId`
/// becomes the settlement idempotency key.
pub async fn invoke_operation(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path(operation): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let identity = match user {
        Some(auth) => Identity::Jwt(auth.user_id),
        None => body
            .get("userId")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .map_or(Identity::Anonymous, Identity::Claimed),
    };

    let operation_key = format!("ai.{operation}");
    let mut request = OperationRequest::new(&operation_key, identity).with_client(
        header_value(&headers, "x-forwarded-for"),
        header_value(&headers, "user-agent"),
    );
    if let Some(reference_id) = body.get("referenceId").and_then(Value::as_str) {
        request = request.with_reference(operation.clone(), reference_id);
    }

    let result = mentora_pipeline::run(
        state.store.as_ref(),
        &state.config.pricing,
        &state.config.schedule,
        &request,
        || async { state.ai.invoke(&operation_key, &body).await },
    )
    .await;

    match result {
        Ok((response, _outcome)) => Ok(Json(response)),
        Err(RunError::Auth(err)) => Err(err.into()),
        Err(RunError::Handler(err)) => Err(ApiError::Upstream(err.to_string())),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}
