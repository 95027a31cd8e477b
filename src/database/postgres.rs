use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::host_repository::{HostAccount, HostRepository};
use crate::database::ledger::LedgerStore;
use crate::database::order_repository::{Order, OrderPatch, OrderRepository};
use crate::database::transaction_data::TransactionData;
use crate::database::transaction_repository::{
    LedgerTransaction, TransactionFilter, TransactionRepository,
};
use crate::services::order_state::OrderStatus;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

/// PostgreSQL-backed ledger store. Both commits run in one database
/// transaction.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_order(&self, id: Uuid) -> DatabaseResult<Option<Order>> {
        OrderRepository::find_by_id(&self.pool, id).await
    }

    async fn find_orders_by_status(
        &self,
        status: OrderStatus,
        limit: usize,
    ) -> DatabaseResult<Vec<Order>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        OrderRepository::find_by_status(&self.pool, status, limit).await
    }

    async fn find_half_settled_orders(&self, limit: usize) -> DatabaseResult<Vec<Order>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        OrderRepository::find_half_settled(&self.pool, limit).await
    }

    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> DatabaseResult<Order> {
        OrderRepository::apply_patch(&self.pool, id, &patch).await
    }

    async fn destroy_order(&self, id: Uuid) -> DatabaseResult<bool> {
        OrderRepository::delete(&self.pool, id).await
    }

    async fn find_host_account(&self, collective_id: Uuid) -> DatabaseResult<Option<HostAccount>> {
        HostRepository::find_by_collective(&self.pool, collective_id).await
    }

    async fn create_transaction(
        &self,
        transaction: LedgerTransaction,
    ) -> DatabaseResult<LedgerTransaction> {
        TransactionRepository::insert(&self.pool, &transaction).await
    }

    async fn find_transaction(
        &self,
        filter: &TransactionFilter,
    ) -> DatabaseResult<Option<LedgerTransaction>> {
        TransactionRepository::find_one(&self.pool, filter).await
    }

    async fn update_transaction_data(
        &self,
        id: Uuid,
        data: TransactionData,
    ) -> DatabaseResult<LedgerTransaction> {
        TransactionRepository::update_data(&self.pool, id, &data).await
    }

    async fn link_refund(&self, id: Uuid, refund_transaction_id: Uuid) -> DatabaseResult<()> {
        TransactionRepository::link_refund(&self.pool, id, refund_transaction_id).await
    }

    async fn commit_settlement(
        &self,
        transaction: LedgerTransaction,
        order_id: Uuid,
        order_patch: OrderPatch,
    ) -> DatabaseResult<LedgerTransaction> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let created = TransactionRepository::insert(&mut *tx, &transaction).await?;
        OrderRepository::apply_patch(&mut *tx, order_id, &order_patch).await?;

        tx.commit().await.map_err(|e| {
            warn!(order_id = %order_id, error = %e, "settlement commit failed");
            DatabaseError::from_sqlx(e)
        })?;
        Ok(created)
    }

    async fn commit_refund(
        &self,
        original_id: Uuid,
        original_data: TransactionData,
        reversal: LedgerTransaction,
    ) -> DatabaseResult<LedgerTransaction> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        TransactionRepository::update_data(&mut *tx, original_id, &original_data).await?;
        let reversal = TransactionRepository::insert(&mut *tx, &reversal).await?;
        TransactionRepository::link_refund(&mut *tx, original_id, reversal.id).await?;

        tx.commit().await.map_err(|e| {
            warn!(transaction_id = %original_id, error = %e, "refund commit failed");
            DatabaseError::from_sqlx(e)
        })?;
        Ok(reversal)
    }

    async fn health_check(&self) -> DatabaseResult<()> {
        crate::database::pool::ping(&self.pool).await
    }
}
