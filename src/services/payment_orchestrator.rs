//! Creates or resumes the provider payment intent behind an order.
//!
//! The intent reference is persisted on the order before anything is
//! returned, so a retried call resumes the same intent instead of creating a
//! second one.

use crate::database::ledger::SharedLedgerStore;
use crate::database::order_repository::{Order, OrderPatch, PaymentIntentRef};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{CreateIntentRequest, IntentStatus, PaymentIntent, PaymentMethodType};
use crate::services::error::{SettlementError, SettlementResult};
use crate::services::order_state::{OrderEvent, OrderStatus, OrderTransition};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const ALIPAY_CURRENCIES: &[&str] = &[
    "aud", "cad", "eur", "gbp", "hkd", "jpy", "nzd", "sgd", "usd", "cny", "myr",
];

/// Which payment method this deployment handles and in which currencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPolicy {
    pub payment_method: PaymentMethodType,
    /// Lowercase ISO codes.
    pub accepted_currencies: Vec<String>,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            payment_method: PaymentMethodType::Alipay,
            accepted_currencies: ALIPAY_CURRENCIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl PaymentPolicy {
    pub fn from_env() -> Self {
        let mut policy = Self::default();
        if let Ok(raw) = std::env::var("ALIPAY_ACCEPTED_CURRENCIES") {
            let parsed: Vec<String> = raw
                .split(',')
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect();
            if !parsed.is_empty() {
                policy.accepted_currencies = parsed;
            }
        }
        policy
    }

    pub fn accepts(&self, currency: &str) -> bool {
        let currency = currency.trim().to_lowercase();
        self.accepted_currencies.iter().any(|c| *c == currency)
    }
}

/// Result of [`PaymentIntentOrchestrator::ensure_intent`].
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    Completed(PaymentIntent),
    /// The payer must complete a redirect.
    ActionRequired(PaymentIntent),
    Failed { intent_id: String, reason: String },
}

pub struct PaymentIntentOrchestrator {
    provider: Arc<dyn PaymentProvider>,
    store: SharedLedgerStore,
    policy: PaymentPolicy,
}

impl PaymentIntentOrchestrator {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: SharedLedgerStore,
        policy: PaymentPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            policy,
        }
    }

    pub fn policy(&self) -> &PaymentPolicy {
        &self.policy
    }

    pub async fn ensure_intent(&self, order: &Order) -> SettlementResult<IntentOutcome> {
        if !self.policy.accepts(&order.currency) {
            return Err(SettlementError::UnsupportedCurrency {
                currency: order.currency.clone(),
                payment_method: self.policy.payment_method,
            });
        }

        let host = self
            .store
            .find_host_account(order.collective_id)
            .await
            .map_err(SettlementError::ledger_read)?;
        let account = host
            .as_ref()
            .and_then(|h| h.connected_account())
            .ok_or(SettlementError::HostNotConnected {
                collective_id: order.collective_id,
            })?;

        let intent = match &order.payment_intent {
            Some(stored) => self.resume_intent(order, stored, account).await?,
            None => self.create_intent(order, account).await?,
        };

        Ok(self.classify(intent))
    }

    /// Loads the order, ensures its intent and moves it to
    /// REQUIRE_CLIENT_CONFIRMATION when the payer has to act.
    ///
    /// An intent that already succeeded takes the same transition: settlement
    /// only runs from REQUIRE_CLIENT_CONFIRMATION, so the order must be there
    /// for the confirm callback to book the credit.
    pub async fn process_order(&self, order_id: Uuid) -> SettlementResult<IntentOutcome> {
        let order = self
            .store
            .find_order(order_id)
            .await
            .map_err(SettlementError::ledger_read)?
            .ok_or_else(|| SettlementError::OrderNotFound {
                order_ref: order_id.to_string(),
            })?;

        let outcome = self.ensure_intent(&order).await?;

        let intent = match &outcome {
            IntentOutcome::ActionRequired(intent) => intent,
            IntentOutcome::Completed(_) if order.status != OrderStatus::Pending => {
                return Ok(outcome)
            }
            IntentOutcome::Completed(intent) => {
                warn!(
                    order_id = %order.id,
                    intent_id = %intent.id,
                    status = %order.status,
                    "intent succeeded without a redirect, awaiting confirm callback to settle"
                );
                intent
            }
            IntentOutcome::Failed { .. } => return Ok(outcome),
        };
        self.await_confirmation(&order, intent).await?;

        Ok(outcome)
    }

    async fn await_confirmation(&self, order: &Order, intent: &PaymentIntent) -> SettlementResult<()> {
        let OrderTransition::Status(next) = order.status.transition(OrderEvent::ActionRequired)?
        else {
            return Ok(());
        };
        if next == order.status {
            return Ok(());
        }

        self.store
            .update_order(order.id, OrderPatch::status(next))
            .await
            .map_err(SettlementError::ledger_write)?;
        info!(
            order_id = %order.id,
            intent_id = %intent.id,
            status = %next,
            "order awaiting client confirmation"
        );
        Ok(())
    }

    async fn create_intent(&self, order: &Order, account: &str) -> SettlementResult<PaymentIntent> {
        let intent = self
            .provider
            .create_payment_intent(CreateIntentRequest {
                amount: order.total_amount,
                currency: order.currency.to_lowercase(),
                payment_method_types: vec![self.policy.payment_method],
                description: order.description.clone(),
                order_reference: order.id.to_string(),
                connected_account: Some(account.to_string()),
                idempotency_key: Some(format!("order-{}-intent", order.id)),
            })
            .await?;

        self.store
            .update_order(
                order.id,
                OrderPatch::intent(PaymentIntentRef {
                    id: intent.id.clone(),
                    status: intent.status,
                }),
            )
            .await
            .map_err(SettlementError::ledger_write)?;

        info!(
            order_id = %order.id,
            intent_id = %intent.id,
            status = %intent.status,
            "payment intent created"
        );
        Ok(intent)
    }

    async fn resume_intent(
        &self,
        order: &Order,
        stored: &PaymentIntentRef,
        account: &str,
    ) -> SettlementResult<PaymentIntent> {
        let intent = self
            .provider
            .retrieve_payment_intent(&stored.id, Some(account))
            .await?;

        if intent.status != stored.status {
            self.store
                .update_order(
                    order.id,
                    OrderPatch::intent(PaymentIntentRef {
                        id: intent.id.clone(),
                        status: intent.status,
                    }),
                )
                .await
                .map_err(SettlementError::ledger_write)?;
        }

        info!(
            order_id = %order.id,
            intent_id = %intent.id,
            status = %intent.status,
            "payment intent resumed"
        );
        Ok(intent)
    }

    fn classify(&self, intent: PaymentIntent) -> IntentOutcome {
        match intent.status {
            IntentStatus::Succeeded => IntentOutcome::Completed(intent),
            IntentStatus::RequiresPaymentMethod
            | IntentStatus::RequiresConfirmation
            | IntentStatus::RequiresAction
            | IntentStatus::Processing => IntentOutcome::ActionRequired(intent),
            IntentStatus::Canceled => IntentOutcome::Failed {
                intent_id: intent.id,
                reason: "Payment intent was canceled".to_string(),
            },
            status @ (IntentStatus::RequiresCapture | IntentStatus::Unknown) => {
                warn!(intent_id = %intent.id, status = %status, "unusable payment intent status");
                IntentOutcome::Failed {
                    intent_id: intent.id,
                    reason: format!("Payment intent is in unexpected status {}", status),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_accepts_alipay_currencies() {
        let policy = PaymentPolicy::default();
        assert_eq!(policy.payment_method, PaymentMethodType::Alipay);
        assert!(policy.accepts("USD"));
        assert!(policy.accepts(" cny "));
        assert!(!policy.accepts("brl"));
    }
}
