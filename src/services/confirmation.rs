//! Finalizes an order when the payer returns from the provider's redirect.

use crate::database::host_repository::HostAccount;
use crate::database::ledger::SharedLedgerStore;
use crate::database::order_repository::{Order, OrderPatch, PaymentIntentRef};
use crate::database::transaction_data::{StripeSettlementV1, TransactionData};
use crate::database::transaction_repository::{LedgerTransaction, TransactionKind};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::IntentStatus;
use crate::services::currency_conversion::CurrencyConverter;
use crate::services::error::{SettlementError, SettlementResult};
use crate::services::fee_calculation::{FeeCalculator, FeeInputs};
use crate::services::order_state::{OrderEvent, OrderTransition};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

pub const PAYMENT_FAILED_REASON: &str = "Payment failed or was cancelled by the payer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectOutcome {
    Succeeded,
    Failed,
}

impl FromStr for RedirectOutcome {
    type Err = SettlementError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "succeeded" => Ok(RedirectOutcome::Succeeded),
            "failed" => Ok(RedirectOutcome::Failed),
            other => Err(SettlementError::UnrecognizedOutcome(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Paid { order_id: Uuid, transaction_id: Uuid },
    AlreadyProcessed { order_id: Uuid },
    Failed { order_id: Uuid, reason: String },
}

impl ConfirmationOutcome {
    pub fn order_id(&self) -> Uuid {
        match self {
            ConfirmationOutcome::Paid { order_id, .. }
            | ConfirmationOutcome::AlreadyProcessed { order_id }
            | ConfirmationOutcome::Failed { order_id, .. } => *order_id,
        }
    }
}

/// In-process mutex per order id. Idle entries are pruned on each acquire.
#[derive(Default, Clone)]
pub struct OrderLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl OrderLocks {
    pub async fn acquire(&self, order_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(order_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct ConfirmationHandler {
    provider: Arc<dyn PaymentProvider>,
    store: SharedLedgerStore,
    locks: OrderLocks,
}

impl ConfirmationHandler {
    pub fn new(provider: Arc<dyn PaymentProvider>, store: SharedLedgerStore) -> Self {
        Self {
            provider,
            store,
            locks: OrderLocks::default(),
        }
    }

    pub async fn confirm(
        &self,
        order_ref: &str,
        intent_ref: &str,
        redirect_outcome: &str,
    ) -> SettlementResult<ConfirmationOutcome> {
        let order_id =
            Uuid::parse_str(order_ref.trim()).map_err(|_| SettlementError::OrderNotFound {
                order_ref: order_ref.to_string(),
            })?;

        let _guard = self.locks.acquire(order_id).await;

        let order = self
            .store
            .find_order(order_id)
            .await
            .map_err(SettlementError::ledger_read)?
            .ok_or_else(|| SettlementError::OrderNotFound {
                order_ref: order_ref.to_string(),
            })?;

        if !order.status.accepts_confirmation() {
            info!(
                order_id = %order.id,
                status = %order.status,
                "confirmation for already processed order ignored"
            );
            return Ok(ConfirmationOutcome::AlreadyProcessed { order_id });
        }

        let outcome = redirect_outcome.parse::<RedirectOutcome>()?;

        // Both outcomes act on the order, so both must name its intent.
        if let Some(stored) = &order.payment_intent {
            if stored.id != intent_ref {
                return Err(SettlementError::IntentMismatch {
                    order_id,
                    received: intent_ref.to_string(),
                });
            }
        }

        match outcome {
            RedirectOutcome::Succeeded => self.settle(&order, intent_ref).await,
            RedirectOutcome::Failed => self.fail(&order, intent_ref).await,
        }
    }

    /// The redirect status is payer-controlled; an intent the provider reports
    /// as succeeded is settled rather than destroyed.
    async fn fail(&self, order: &Order, intent_ref: &str) -> SettlementResult<ConfirmationOutcome> {
        order.status.transition(OrderEvent::ConfirmationFailed)?;

        let host = self
            .store
            .find_host_account(order.collective_id)
            .await
            .map_err(SettlementError::ledger_read)?;
        if let Some(account) = host.as_ref().and_then(|h| h.connected_account()) {
            let intent = self
                .provider
                .retrieve_payment_intent(intent_ref, Some(account))
                .await?;
            if intent.status == IntentStatus::Succeeded {
                warn!(
                    order_id = %order.id,
                    intent_id = %intent.id,
                    "failed redirect for a succeeded intent, settling instead"
                );
                return self.settle(order, intent_ref).await;
            }
        }

        self.store
            .destroy_order(order.id)
            .await
            .map_err(SettlementError::ledger_write)?;

        info!(order_id = %order.id, "payment redirect failed, order destroyed");
        Ok(ConfirmationOutcome::Failed {
            order_id: order.id,
            reason: PAYMENT_FAILED_REASON.to_string(),
        })
    }

    async fn settle(&self, order: &Order, intent_ref: &str) -> SettlementResult<ConfirmationOutcome> {
        let next = match order.status.transition(OrderEvent::ConfirmationSucceeded)? {
            OrderTransition::Status(next) => next,
            OrderTransition::Destroyed => {
                return Err(SettlementError::IllegalTransition {
                    from: order.status,
                    event: OrderEvent::ConfirmationSucceeded,
                })
            }
        };

        let host = self.connected_host(order).await?;
        let account = host.connected_account();

        let intent = self
            .provider
            .retrieve_payment_intent(intent_ref, account)
            .await?;
        if intent.status != IntentStatus::Succeeded {
            return Err(SettlementError::SettlementIncomplete(format!(
                "intent {} is {}",
                intent.id, intent.status
            )));
        }
        let charge = intent.first_charge().ok_or_else(|| {
            SettlementError::SettlementIncomplete(format!("intent {} has no charge", intent.id))
        })?;
        let balance_id = charge.balance_transaction.as_deref().ok_or_else(|| {
            SettlementError::SettlementIncomplete(format!(
                "charge {} has no balance transaction",
                charge.id
            ))
        })?;
        let balance = self
            .provider
            .retrieve_balance_transaction(balance_id, account)
            .await?;

        let host_amount = CurrencyConverter::settle(order.total_amount, &balance);
        let processor_fees = balance.processor_fees();
        let fees = FeeCalculator::calculate(&FeeInputs {
            amount_in_host_currency: host_amount.amount_in_host_currency,
            fx_rate: &host_amount.fx.rate,
            order,
            host: &host,
            processor_fees: &processor_fees,
        });

        let transaction = LedgerTransaction {
            id: Uuid::new_v4(),
            kind: TransactionKind::Credit,
            is_refund: false,
            description: order.description.clone(),
            amount: order.total_amount,
            currency: order.currency.clone(),
            host_currency: host_amount.host_currency,
            amount_in_host_currency: host_amount.amount_in_host_currency,
            host_currency_fx_rate: host_amount.fx.rate,
            fx_rate_flagged: host_amount.fx.flagged,
            payment_processor_fee_in_host_currency: fees.processor_fee,
            host_fee_in_host_currency: fees.host_fee,
            platform_fee_in_host_currency: fees.platform_fee,
            tax_amount: order.tax_amount,
            order_id: Some(order.id),
            collective_id: order.collective_id,
            from_collective_id: order.from_collective_id,
            host_collective_id: host.host_collective_id,
            payment_method_id: order.payment_method_id,
            payment_method_type: order.payment_method_type,
            created_by_user_id: order.created_by_user_id,
            provider_charge_id: Some(charge.id.clone()),
            data: TransactionData::Stripe(StripeSettlementV1::from_settlement(
                &intent, charge, &balance,
            )),
            refund_transaction_id: None,
            created_at: Utc::now(),
        };

        let patch = OrderPatch::intent(PaymentIntentRef {
            id: intent.id.clone(),
            status: intent.status,
        })
        .with_status(next);

        match self
            .store
            .commit_settlement(transaction, order.id, patch)
            .await
        {
            Ok(created) => {
                info!(
                    order_id = %order.id,
                    transaction_id = %created.id,
                    charge_id = %charge.id,
                    amount_in_host_currency = created.amount_in_host_currency,
                    "order settled"
                );
                Ok(ConfirmationOutcome::Paid {
                    order_id: order.id,
                    transaction_id: created.id,
                })
            }
            Err(e) if e.is_duplicate() => {
                warn!(
                    order_id = %order.id,
                    charge_id = %charge.id,
                    "settlement already recorded by a concurrent confirmation"
                );
                Ok(ConfirmationOutcome::AlreadyProcessed { order_id: order.id })
            }
            Err(e) => Err(SettlementError::ledger_write(e)),
        }
    }

    async fn connected_host(&self, order: &Order) -> SettlementResult<HostAccount> {
        let host = self
            .store
            .find_host_account(order.collective_id)
            .await
            .map_err(SettlementError::ledger_read)?;
        match host {
            Some(host) if host.connected_account().is_some() => Ok(host),
            _ => Err(SettlementError::HostAccountMissing {
                collective_id: order.collective_id,
            }),
        }
    }
}
