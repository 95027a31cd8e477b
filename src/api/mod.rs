//! HTTP surface: redirect callback, provider webhooks, intent creation and health

pub mod confirm;
pub mod health;
pub mod orders;
pub mod webhooks;

use crate::config::RedirectConfig;
use crate::health::HealthChecker;
use crate::services::confirmation::ConfirmationHandler;
use crate::services::payment_orchestrator::PaymentIntentOrchestrator;
use crate::services::webhook_processor::WebhookProcessor;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentIntentOrchestrator>,
    pub confirmation: Arc<ConfirmationHandler>,
    pub webhooks: Arc<WebhookProcessor>,
    pub redirect: Arc<RedirectConfig>,
    pub health: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/payments/stripe/confirm", get(confirm::confirm_redirect))
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .route(
            "/orders/{order_id}/payment-intent",
            post(orders::create_payment_intent),
        )
        .with_state(state)
}
