use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::AppState;
use crate::error::AppError;
use crate::middleware::error::with_request_id;
use crate::payments::types::{IntentStatus, PaymentIntent};
use crate::services::error::SettlementError;
use crate::services::payment_orchestrator::IntentOutcome;

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub order_id: Uuid,
    pub outcome: &'static str,
    pub intent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IntentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_action_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PaymentIntentResponse {
    fn from_outcome(order_id: Uuid, outcome: IntentOutcome) -> Self {
        match outcome {
            IntentOutcome::Completed(intent) => Self::with_intent(order_id, "completed", intent),
            IntentOutcome::ActionRequired(intent) => {
                Self::with_intent(order_id, "action_required", intent)
            }
            IntentOutcome::Failed { intent_id, reason } => Self {
                order_id,
                outcome: "failed",
                intent_id,
                status: None,
                client_secret: None,
                next_action_url: None,
                reason: Some(reason),
            },
        }
    }

    fn with_intent(order_id: Uuid, outcome: &'static str, intent: PaymentIntent) -> Self {
        Self {
            order_id,
            outcome,
            intent_id: intent.id,
            status: Some(intent.status),
            client_secret: intent.client_secret,
            next_action_url: intent.next_action_url,
            reason: None,
        }
    }
}

/// POST /orders/{order_id}/payment-intent
pub async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_ref): Path<String>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    let order_id = Uuid::parse_str(&order_ref)
        .map_err(|_| SettlementError::OrderNotFound { order_ref })
        .map_err(|e| with_request_id(e.into(), &headers))?;

    let outcome = state
        .orchestrator
        .process_order(order_id)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;
    Ok(Json(PaymentIntentResponse::from_outcome(order_id, outcome)))
}
