use crate::database::error::DatabaseResult;
use crate::database::host_repository::HostAccount;
use crate::database::order_repository::{Order, OrderPatch};
use crate::database::transaction_data::TransactionData;
use crate::database::transaction_repository::{LedgerTransaction, TransactionFilter};
use crate::services::order_state::OrderStatus;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Persistence for orders, host accounts and ledger transactions.
///
/// `commit_settlement` and `commit_refund` have sequential default
/// implementations. Stores with multi-row transactions override them to
/// commit atomically; for the rest, the settlement repair worker closes the
/// gap a crash between the two writes leaves behind.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_order(&self, id: Uuid) -> DatabaseResult<Option<Order>>;

    async fn find_orders_by_status(
        &self,
        status: OrderStatus,
        limit: usize,
    ) -> DatabaseResult<Vec<Order>>;

    /// Orders still in REQUIRE_CLIENT_CONFIRMATION that already have a
    /// settlement credit, oldest first.
    async fn find_half_settled_orders(&self, limit: usize) -> DatabaseResult<Vec<Order>>;

    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> DatabaseResult<Order>;

    async fn destroy_order(&self, id: Uuid) -> DatabaseResult<bool>;

    async fn find_host_account(&self, collective_id: Uuid) -> DatabaseResult<Option<HostAccount>>;

    /// Fails with a unique violation when a second settlement credit is
    /// created for the same order or charge.
    async fn create_transaction(
        &self,
        transaction: LedgerTransaction,
    ) -> DatabaseResult<LedgerTransaction>;

    async fn find_transaction(
        &self,
        filter: &TransactionFilter,
    ) -> DatabaseResult<Option<LedgerTransaction>>;

    async fn update_transaction_data(
        &self,
        id: Uuid,
        data: TransactionData,
    ) -> DatabaseResult<LedgerTransaction>;

    /// Fails with a conflict when the transaction is already linked.
    async fn link_refund(&self, id: Uuid, refund_transaction_id: Uuid) -> DatabaseResult<()>;

    /// Writes the settlement credit, then moves the order.
    async fn commit_settlement(
        &self,
        transaction: LedgerTransaction,
        order_id: Uuid,
        order_patch: OrderPatch,
    ) -> DatabaseResult<LedgerTransaction> {
        let created = self.create_transaction(transaction).await?;
        self.update_order(order_id, order_patch).await?;
        Ok(created)
    }

    /// Attaches refund facts to the original, writes the reversal and links
    /// the original to it.
    async fn commit_refund(
        &self,
        original_id: Uuid,
        original_data: TransactionData,
        reversal: LedgerTransaction,
    ) -> DatabaseResult<LedgerTransaction> {
        self.update_transaction_data(original_id, original_data)
            .await?;
        let reversal = self.create_transaction(reversal).await?;
        self.link_refund(original_id, reversal.id).await?;
        Ok(reversal)
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        Ok(())
    }
}

pub type SharedLedgerStore = Arc<dyn LedgerStore>;
