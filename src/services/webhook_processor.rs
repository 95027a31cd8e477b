use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::payments::provider::PaymentProvider;
use crate::payments::types::WebhookPayload;
use crate::services::error::SettlementError;
use crate::services::refund_reconciler::{RefundOutcome, RefundReconciler};

#[derive(Debug, Error)]
pub enum WebhookProcessorError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Malformed webhook: {0}")]
    Malformed(String),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// One entry per registered reconciler.
    Refund { results: Vec<RefundOutcome> },
    Ignored { event_type: String },
}

/// Verifies provider webhooks and fans refund events out to the reconcilers.
pub struct WebhookProcessor {
    provider: Arc<dyn PaymentProvider>,
    reconcilers: Vec<Arc<RefundReconciler>>,
}

impl WebhookProcessor {
    pub fn new(provider: Arc<dyn PaymentProvider>, reconcilers: Vec<Arc<RefundReconciler>>) -> Self {
        Self {
            provider,
            reconcilers,
        }
    }

    pub async fn process_webhook(
        &self,
        signature: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookOutcome, WebhookProcessorError> {
        let provider_name = self.provider.name();
        let signature = signature.ok_or(WebhookProcessorError::InvalidSignature)?;

        let verification = self
            .provider
            .verify_webhook(payload, signature)
            .map_err(|e| WebhookProcessorError::Malformed(e.to_string()))?;
        if !verification.valid {
            error!(
                provider = %provider_name,
                reason = verification.reason.as_deref().unwrap_or("unknown"),
                "Invalid webhook signature"
            );
            return Err(WebhookProcessorError::InvalidSignature);
        }

        let event = self
            .provider
            .parse_webhook_event(payload)
            .map_err(|e| WebhookProcessorError::Malformed(e.to_string()))?;

        match &event.payload {
            WebhookPayload::RefundUpdated(refund) => {
                info!(
                    event_id = %event.id,
                    refund_id = %refund.id,
                    charge_id = %refund.charge,
                    "Processing refund webhook"
                );
                let results = try_join_all(
                    self.reconcilers
                        .iter()
                        .map(|reconciler| reconciler.on_refund_event(refund)),
                )
                .await
                .map_err(|e| {
                    warn!(event_id = %event.id, error = %e, "Refund reconciliation failed");
                    e
                })?;
                Ok(WebhookOutcome::Refund { results })
            }
            WebhookPayload::Unhandled(_) => {
                debug!(event_id = %event.id, event_type = %event.event_type, "Unhandled webhook event type");
                Ok(WebhookOutcome::Ignored {
                    event_type: event.event_type,
                })
            }
        }
    }
}
