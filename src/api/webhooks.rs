use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use super::AppState;
use crate::error::AppError;
use crate::middleware::error::with_request_id;
use crate::services::webhook_processor::WebhookProcessorError;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /webhooks/stripe
///
/// The raw body is verified as received; it must not be re-serialized before
/// the signature check.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if signature.is_none() {
        warn!("Missing stripe webhook signature");
        return (StatusCode::UNAUTHORIZED, "Missing signature").into_response();
    }

    match state.webhooks.process_webhook(signature, &body).await {
        Ok(outcome) => {
            info!(?outcome, "Stripe webhook processed");
            ok()
        }
        Err(WebhookProcessorError::InvalidSignature) => {
            warn!("Invalid stripe webhook signature");
            (StatusCode::UNAUTHORIZED, "Invalid signature").into_response()
        }
        Err(WebhookProcessorError::Malformed(reason)) => {
            error!(reason = %reason, "Malformed stripe webhook");
            (StatusCode::BAD_REQUEST, "Malformed webhook").into_response()
        }
        // Surfaced so the provider redelivers.
        Err(WebhookProcessorError::Settlement(e)) => {
            with_request_id(AppError::from(e), &headers).into_response()
        }
    }
}

fn ok() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}
