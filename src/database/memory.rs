use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::host_repository::HostAccount;
use crate::database::ledger::LedgerStore;
use crate::database::order_repository::{Order, OrderPatch};
use crate::database::transaction_data::TransactionData;
use crate::database::transaction_repository::{LedgerTransaction, TransactionFilter};
use crate::services::order_state::OrderStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct LedgerState {
    orders: HashMap<Uuid, Order>,
    hosts: HashMap<Uuid, HostAccount>,
    /// Insertion order doubles as creation order.
    transactions: Vec<LedgerTransaction>,
}

impl LedgerState {
    fn patch_order(&mut self, id: Uuid, patch: &OrderPatch) -> DatabaseResult<Order> {
        let order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("order", id))?;
        order.apply(patch);
        Ok(order.clone())
    }

    /// Mirrors the partial unique indexes of the PostgreSQL schema.
    fn insert_transaction(&mut self, tx: LedgerTransaction) -> DatabaseResult<LedgerTransaction> {
        if self.transactions.iter().any(|t| t.id == tx.id) {
            return Err(DatabaseError::unique_violation("transactions_pkey"));
        }
        if tx.is_settlement() {
            let duplicate = self.transactions.iter().filter(|t| t.is_settlement()).any(|t| {
                (tx.order_id.is_some() && t.order_id == tx.order_id)
                    || (tx.provider_charge_id.is_some()
                        && t.provider_charge_id == tx.provider_charge_id)
            });
            if duplicate {
                return Err(DatabaseError::unique_violation(
                    "transactions_settlement_credit_key",
                ));
            }
        }
        self.transactions.push(tx.clone());
        Ok(tx)
    }

    fn transaction_mut(&mut self, id: Uuid) -> DatabaseResult<&mut LedgerTransaction> {
        self.transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| DatabaseError::not_found("transaction", id))
    }
}

/// Thread-safe in-memory ledger store for tests and local runs.
///
/// All state sits behind one lock, so both commits are atomic.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order: Order) {
        self.state.write().await.orders.insert(order.id, order);
    }

    pub async fn insert_host_account(&self, host: HostAccount) {
        self.state
            .write()
            .await
            .hosts
            .insert(host.collective_id, host);
    }

    pub async fn transactions(&self) -> Vec<LedgerTransaction> {
        self.state.read().await.transactions.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_order(&self, id: Uuid) -> DatabaseResult<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_orders_by_status(
        &self,
        status: OrderStatus,
        limit: usize,
    ) -> DatabaseResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.updated_at);
        orders.truncate(limit);
        Ok(orders)
    }

    async fn find_half_settled_orders(&self, limit: usize) -> DatabaseResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .transactions
            .iter()
            .filter(|t| t.is_settlement())
            .filter_map(|t| t.order_id.and_then(|id| state.orders.get(&id)))
            .filter(|o| o.status == OrderStatus::RequireClientConfirmation)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.updated_at);
        orders.truncate(limit);
        Ok(orders)
    }

    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> DatabaseResult<Order> {
        self.state.write().await.patch_order(id, &patch)
    }

    async fn destroy_order(&self, id: Uuid) -> DatabaseResult<bool> {
        Ok(self.state.write().await.orders.remove(&id).is_some())
    }

    async fn find_host_account(&self, collective_id: Uuid) -> DatabaseResult<Option<HostAccount>> {
        Ok(self.state.read().await.hosts.get(&collective_id).cloned())
    }

    async fn create_transaction(
        &self,
        transaction: LedgerTransaction,
    ) -> DatabaseResult<LedgerTransaction> {
        self.state.write().await.insert_transaction(transaction)
    }

    async fn find_transaction(
        &self,
        filter: &TransactionFilter,
    ) -> DatabaseResult<Option<LedgerTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .find(|t| filter.matches(t))
            .cloned())
    }

    async fn update_transaction_data(
        &self,
        id: Uuid,
        data: TransactionData,
    ) -> DatabaseResult<LedgerTransaction> {
        let mut state = self.state.write().await;
        let tx = state.transaction_mut(id)?;
        tx.data = data;
        Ok(tx.clone())
    }

    async fn link_refund(&self, id: Uuid, refund_transaction_id: Uuid) -> DatabaseResult<()> {
        let mut state = self.state.write().await;
        let tx = state.transaction_mut(id)?;
        if tx.refund_transaction_id.is_some() {
            return Err(DatabaseError::conflict(format!(
                "transaction {} is already linked to a refund",
                id
            )));
        }
        tx.refund_transaction_id = Some(refund_transaction_id);
        Ok(())
    }

    async fn commit_settlement(
        &self,
        transaction: LedgerTransaction,
        order_id: Uuid,
        order_patch: OrderPatch,
    ) -> DatabaseResult<LedgerTransaction> {
        let mut state = self.state.write().await;
        if !state.orders.contains_key(&order_id) {
            return Err(DatabaseError::not_found("order", order_id));
        }
        let created = state.insert_transaction(transaction)?;
        state.patch_order(order_id, &order_patch)?;
        Ok(created)
    }

    async fn commit_refund(
        &self,
        original_id: Uuid,
        original_data: TransactionData,
        reversal: LedgerTransaction,
    ) -> DatabaseResult<LedgerTransaction> {
        let mut state = self.state.write().await;
        if state.transaction_mut(original_id)?.refund_transaction_id.is_some() {
            return Err(DatabaseError::conflict(format!(
                "transaction {} is already linked to a refund",
                original_id
            )));
        }
        let reversal = state.insert_transaction(reversal)?;
        let original = state.transaction_mut(original_id)?;
        original.data = original_data;
        original.refund_transaction_id = Some(reversal.id);
        Ok(reversal)
    }
}
