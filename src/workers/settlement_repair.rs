//! Background repair of half-committed settlements.
//!
//! A settlement writes the ledger credit before it moves the order to PAID. On
//! stores that cannot do both in one transaction a crash between the two writes
//! leaves an order in REQUIRE_CLIENT_CONFIRMATION with a credit already booked.
//! This worker finds those orders and finishes the transition.

use crate::database::ledger::SharedLedgerStore;
use crate::database::order_repository::{Order, OrderPatch, PaymentIntentRef};
use crate::database::transaction_data::TransactionData;
use crate::database::transaction_repository::TransactionFilter;
use crate::payments::types::IntentStatus;
use crate::services::error::{SettlementError, SettlementResult};
use crate::services::order_state::{OrderEvent, OrderTransition};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SettlementRepairConfig {
    /// How often the worker wakes up.
    pub interval: Duration,
    /// Maximum number of half-settled orders repaired per cycle.
    pub batch_size: usize,
}

impl Default for SettlementRepairConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

impl SettlementRepairConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.interval = Duration::from_secs(
            std::env::var("SETTLEMENT_REPAIR_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(cfg.interval.as_secs()),
        );
        cfg.batch_size = std::env::var("SETTLEMENT_REPAIR_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(cfg.batch_size);
        cfg
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub scanned: usize,
    pub repaired: usize,
}

pub struct SettlementRepairWorker {
    store: SharedLedgerStore,
    config: SettlementRepairConfig,
}

impl SettlementRepairWorker {
    pub fn new(store: SharedLedgerStore, config: SettlementRepairConfig) -> Self {
        Self { store, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "settlement repair worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("settlement repair worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    match self.run_once().await {
                        Ok(report) if report.repaired > 0 => {
                            info!(
                                scanned = report.scanned,
                                repaired = report.repaired,
                                "settlement repair cycle finished"
                            );
                        }
                        Ok(report) => {
                            debug!(scanned = report.scanned, "settlement repair cycle finished");
                        }
                        Err(e) => warn!(error = %e, "settlement repair cycle failed"),
                    }
                }
            }
        }

        info!("settlement repair worker stopped");
    }

    /// One pass over awaiting orders that already carry a settlement credit.
    /// Abandoned redirects have no credit and are never selected.
    pub async fn run_once(&self) -> SettlementResult<RepairReport> {
        let awaiting = self
            .store
            .find_half_settled_orders(self.config.batch_size)
            .await
            .map_err(SettlementError::ledger_read)?;

        let mut report = RepairReport {
            scanned: awaiting.len(),
            repaired: 0,
        };

        for order in awaiting {
            match self.repair(&order).await {
                Ok(true) => report.repaired += 1,
                Ok(false) => {}
                // One broken order must not stall the rest of the batch.
                Err(e) => warn!(order_id = %order.id, error = %e, "settlement repair failed"),
            }
        }

        Ok(report)
    }

    async fn repair(&self, order: &Order) -> SettlementResult<bool> {
        let settlement = self
            .store
            .find_transaction(&TransactionFilter::settlement_for_order(order.id))
            .await
            .map_err(SettlementError::ledger_read)?;
        let Some(settlement) = settlement else {
            return Ok(false);
        };

        let OrderTransition::Status(next) =
            order.status.transition(OrderEvent::ConfirmationSucceeded)?
        else {
            return Ok(false);
        };

        let TransactionData::Stripe(data) = &settlement.data;
        let patch = OrderPatch::intent(PaymentIntentRef {
            id: data.payment_intent_id.clone(),
            status: IntentStatus::Succeeded,
        })
        .with_status(next);

        self.store
            .update_order(order.id, patch)
            .await
            .map_err(SettlementError::ledger_write)?;

        info!(
            order_id = %order.id,
            transaction_id = %settlement.id,
            "order marked paid from existing settlement"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let cfg = SettlementRepairConfig::default();
        assert_eq!(cfg.interval, Duration::from_secs(60));
        assert_eq!(cfg.batch_size, 100);
    }
}
