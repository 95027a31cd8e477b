//! GET /payments/stripe/confirm
//!
//! The provider sends the payer's browser here after the redirect flow. The
//! response is always a browser redirect: to the success page for a settled or
//! already settled order, to the error page with a reason otherwise.

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::AppState;
use crate::error::AppError;
use crate::services::confirmation::ConfirmationOutcome;

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    #[serde(rename = "OrderId")]
    pub order_id: Option<String>,
    pub payment_intent: Option<String>,
    pub redirect_status: Option<String>,
}

pub async fn confirm_redirect(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Redirect {
    let (Some(order_ref), Some(intent_ref), Some(outcome)) = (
        query.order_id.as_deref(),
        query.payment_intent.as_deref(),
        query.redirect_status.as_deref(),
    ) else {
        warn!(?query, "confirmation callback with missing parameters");
        return Redirect::to(
            &state
                .redirect
                .error_redirect("Missing payment confirmation parameters"),
        );
    };

    match state.confirmation.confirm(order_ref, intent_ref, outcome).await {
        Ok(ConfirmationOutcome::Paid { order_id, .. })
        | Ok(ConfirmationOutcome::AlreadyProcessed { order_id }) => {
            Redirect::to(&state.redirect.success_redirect(&order_id.to_string()))
        }
        Ok(ConfirmationOutcome::Failed { order_id, reason }) => {
            info!(order_id = %order_id, "redirecting payer to error page");
            Redirect::to(&state.redirect.error_redirect(&reason))
        }
        Err(e) => {
            let error = AppError::from(e);
            warn!(
                order_ref = %order_ref,
                intent_id = %intent_ref,
                error = %error,
                "payment confirmation failed"
            );
            Redirect::to(&state.redirect.error_redirect(&error.user_message()))
        }
    }
}
