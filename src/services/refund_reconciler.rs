//! Posts the reversal for a refund the provider completed out of band.
//!
//! Redelivered and unrelated events are acknowledged without writing: a charge
//! with no ledger credit, and a credit that already carries a
//! `refund_transaction_id`, both end as [`RefundOutcome::Ignored`].

use crate::database::ledger::SharedLedgerStore;
use crate::database::transaction_data::{StripeRefundV1, TransactionData};
use crate::database::transaction_repository::{LedgerTransaction, TransactionFilter};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{PaymentMethodType, Refund, RefundStatus};
use crate::services::error::{SettlementError, SettlementResult};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundIgnoreReason {
    NotSucceeded,
    TransactionNotFound,
    AlreadyRefunded,
    /// The original credit was paid with a method this reconciler does not handle.
    ForeignPaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefundOutcome {
    Reversed {
        original_transaction_id: Uuid,
        refund_transaction_id: Uuid,
    },
    Ignored { reason: RefundIgnoreReason },
}

impl RefundOutcome {
    fn ignored(reason: RefundIgnoreReason) -> Self {
        RefundOutcome::Ignored { reason }
    }
}

pub struct RefundReconciler {
    provider: Arc<dyn PaymentProvider>,
    store: SharedLedgerStore,
    payment_method: PaymentMethodType,
}

impl RefundReconciler {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: SharedLedgerStore,
        payment_method: PaymentMethodType,
    ) -> Self {
        Self {
            provider,
            store,
            payment_method,
        }
    }

    pub fn payment_method(&self) -> PaymentMethodType {
        self.payment_method
    }

    pub async fn on_refund_event(&self, refund: &Refund) -> SettlementResult<RefundOutcome> {
        if refund.status != RefundStatus::Succeeded {
            debug!(refund_id = %refund.id, status = ?refund.status, "refund not yet succeeded");
            return Ok(RefundOutcome::ignored(RefundIgnoreReason::NotSucceeded));
        }

        let original = self
            .store
            .find_transaction(&TransactionFilter::original_charge(&refund.charge))
            .await
            .map_err(SettlementError::ledger_read)?;
        let Some(original) = original else {
            info!(
                refund_id = %refund.id,
                charge_id = %refund.charge,
                "refund for unknown charge acknowledged"
            );
            return Ok(RefundOutcome::ignored(RefundIgnoreReason::TransactionNotFound));
        };

        if original.payment_method_type != self.payment_method {
            return Ok(RefundOutcome::ignored(
                RefundIgnoreReason::ForeignPaymentMethod,
            ));
        }

        if original.refund_transaction_id.is_some() {
            info!(
                refund_id = %refund.id,
                transaction_id = %original.id,
                "refund already reconciled"
            );
            return Ok(RefundOutcome::ignored(RefundIgnoreReason::AlreadyRefunded));
        }

        let host = self
            .store
            .find_host_account(original.collective_id)
            .await
            .map_err(SettlementError::ledger_read)?;
        let account = host
            .as_ref()
            .and_then(|h| h.connected_account())
            .ok_or(SettlementError::HostAccountMissing {
                collective_id: original.collective_id,
            })?;

        let balance = match refund.balance_transaction.as_deref() {
            Some(id) => Some(
                self.provider
                    .retrieve_balance_transaction(id, Some(account))
                    .await?,
            ),
            None => {
                warn!(refund_id = %refund.id, "refund has no balance transaction");
                None
            }
        };
        let refund_facts = StripeRefundV1::from_refund(refund, balance.as_ref());
        let processor_fee = refund_facts.processor_fee;
        let original_data = original.data.with_refund(refund_facts);
        let reversal = build_reversal(&original, processor_fee, original_data.clone());

        match self
            .store
            .commit_refund(original.id, original_data, reversal)
            .await
        {
            Ok(reversal) => {
                info!(
                    refund_id = %refund.id,
                    charge_id = %refund.charge,
                    transaction_id = %original.id,
                    refund_transaction_id = %reversal.id,
                    "refund reversal posted"
                );
                Ok(RefundOutcome::Reversed {
                    original_transaction_id: original.id,
                    refund_transaction_id: reversal.id,
                })
            }
            Err(e) if e.is_duplicate() => {
                warn!(
                    refund_id = %refund.id,
                    transaction_id = %original.id,
                    "refund reconciled concurrently"
                );
                Ok(RefundOutcome::ignored(RefundIgnoreReason::AlreadyRefunded))
            }
            Err(e) => Err(SettlementError::ledger_write(e)),
        }
    }
}

/// Mirror of `original` with the collectives swapped, linked back to it.
fn build_reversal(
    original: &LedgerTransaction,
    processor_fee: i64,
    data: TransactionData,
) -> LedgerTransaction {
    LedgerTransaction {
        id: Uuid::new_v4(),
        is_refund: true,
        description: Some(format!(
            "Refund of \"{}\"",
            original.description.as_deref().unwrap_or("contribution")
        )),
        collective_id: original.from_collective_id,
        from_collective_id: original.collective_id,
        payment_processor_fee_in_host_currency: processor_fee,
        refund_transaction_id: Some(original.id),
        data,
        created_at: Utc::now(),
        ..original.clone()
    }
}
