//! Axum handler and router for Paystack webhooks.
//!
//! This module provides the HTTP layer for receiving webhook deliveries.
//!
//! # Key Features
//!
//! - **Raw Body Extraction**: captures the exact bytes for signature verification
//! - **Total Responses**: every signature-valid delivery is acknowledged with 200,
//!   even when the payload is unusable or a store fails
//! - **Verbatim Contract**: response bodies match what Paystack's redelivery
//!   logic expects
//!
//! # Endpoints
//!
//! - `POST /webhooks/paystack` - webhook deliveries
//! - `GET /webhooks/paystack/health` - subsystem probe
//!
//! # Headers
//!
//! Required:
//! - `x-paystack-signature`: hex HMAC-SHA512 of the raw body
//! - `Content-Type: application/json`

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::handlers::AppState;
use crate::paystack::dispatcher::{DispatchState, Dispatcher};

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Route the webhook endpoint is mounted on.
pub const WEBHOOK_PATH: &str = "/webhooks/paystack";

/// Route of the webhook subsystem's health probe.
pub const WEBHOOK_HEALTH_PATH: &str = "/webhooks/paystack/health";

/// Shared state for the webhook handler.
#[derive(Clone)]
pub struct WebhookState {
    /// Delivery pipeline
    pub dispatcher: Arc<Dispatcher>,
    /// Request-level counters and latency tracking
    pub app: Arc<AppState>,
}

impl WebhookState {
    /// Bundle the pipeline with the shared request-tracking state.
    pub fn new(dispatcher: Arc<Dispatcher>, app: Arc<AppState>) -> Self {
        Self { dispatcher, app }
    }
}

/// Acknowledgment body for every signature-valid delivery.
#[derive(Debug, Clone, Serialize)]
pub struct AckResponse {
    /// Always `"success"`
    pub status: &'static str,
}

impl AckResponse {
    fn success() -> Self {
        Self { status: "success" }
    }
}

/// Rejection body for signature failures.
#[derive(Debug, Clone, Serialize)]
pub struct RejectResponse {
    /// Always `"Invalid signature"`
    pub error: &'static str,
}

impl RejectResponse {
    fn invalid_signature() -> Self {
        Self {
            error: "Invalid signature",
        }
    }
}

/// Create the Paystack webhook router.
///
/// # Example
///
/// ```rust,ignore
/// use paystack_router::paystack::{webhook_router, WebhookState};
///
/// let state = WebhookState::new(dispatcher, app);
/// let router = webhook_router(state);
/// ```
pub fn webhook_router(state: WebhookState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(webhook_handler))
        .route(WEBHOOK_HEALTH_PATH, get(webhook_health))
        .with_state(state)
}

/// Health probe scoped to the webhook subsystem.
///
/// The service-level probes live on the status router; this one lets an
/// ingress check target the webhook endpoint specifically.
pub async fn webhook_health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "service": "paystack-webhook-handler"
        })),
    )
}

/// Main webhook handler.
///
/// Hands the raw body and the `x-paystack-signature` header to the dispatch
/// pipeline and maps the terminal state onto the HTTP contract:
///
/// - `Rejected` answers `400` with `{"error": "Invalid signature"}`
/// - every other terminal state answers `200` with `{"status": "success"}`
///
/// A signature header that is not valid UTF-8 cannot match any hex digest, so
/// it is treated the same as a missing header.
pub async fn webhook_handler(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.dispatcher.dispatch(&body, signature).await;

    if outcome.state == DispatchState::Rejected {
        state.app.record_rejected();
        return (
            StatusCode::BAD_REQUEST,
            Json(RejectResponse::invalid_signature()),
        )
            .into_response();
    }

    state.app.record_delivery(started.elapsed());
    if outcome.forward.as_ref().is_some_and(|forward| forward.ok) {
        state.app.record_forward();
    }

    (StatusCode::OK, Json(AckResponse::success())).into_response()
}
