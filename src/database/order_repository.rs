use crate::payments::types::{IntentStatus, PaymentMethodType};
use crate::services::order_state::OrderStatus;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provider intent handle persisted on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentRef {
    pub id: String,
    pub status: IntentStatus,
}

/// A payer's order to fund a collective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub currency: String,
    /// Minor units of `currency`.
    pub total_amount: i64,
    pub tax_amount: Option<i64>,
    /// Pre-agreed platform contribution, in order currency minor units.
    pub platform_tip: Option<i64>,
    /// Overrides the host's default host fee percent.
    pub host_fee_percent: Option<BigDecimal>,
    pub status: OrderStatus,
    pub payment_intent: Option<PaymentIntentRef>,
    pub payment_method_id: Option<Uuid>,
    pub payment_method_type: PaymentMethodType,
    pub collective_id: Uuid,
    pub from_collective_id: Uuid,
    pub created_by_user_id: Uuid,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A fresh PENDING order with no intent attached.
    pub fn pending(
        collective_id: Uuid,
        from_collective_id: Uuid,
        created_by_user_id: Uuid,
        currency: &str,
        total_amount: i64,
        payment_method_type: PaymentMethodType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            currency: currency.to_lowercase(),
            total_amount,
            tax_amount: None,
            platform_tip: None,
            host_fee_percent: None,
            status: OrderStatus::Pending,
            payment_intent: None,
            payment_method_id: None,
            payment_method_type,
            collective_id,
            from_collective_id,
            created_by_user_id,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: &OrderPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(intent) = &patch.payment_intent {
            self.payment_intent = Some(intent.clone());
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of the mutable order fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub payment_intent: Option<PaymentIntentRef>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            payment_intent: None,
        }
    }

    pub fn intent(intent: PaymentIntentRef) -> Self {
        Self {
            status: None,
            payment_intent: Some(intent),
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(feature = "database")]
pub use pg::OrderRepository;

#[cfg(feature = "database")]
mod pg {
    use super::{Order, OrderPatch, PaymentIntentRef};
    use crate::database::error::{DatabaseError, DatabaseErrorKind, DatabaseResult};
    use crate::payments::types::{IntentStatus, PaymentMethodType};
    use crate::services::order_state::OrderStatus;
    use sqlx::{types::BigDecimal, FromRow, PgExecutor};
    use std::str::FromStr;
    use uuid::Uuid;

    const ORDER_COLUMNS: &str = "id, currency, total_amount, tax_amount, platform_tip, \
         host_fee_percent, status, payment_intent_id, payment_intent_status, \
         payment_method_id, payment_method_type, collective_id, from_collective_id, \
         created_by_user_id, description, created_at, updated_at";

    #[derive(Debug, Clone, FromRow)]
    struct OrderRow {
        id: Uuid,
        currency: String,
        total_amount: i64,
        tax_amount: Option<i64>,
        platform_tip: Option<i64>,
        host_fee_percent: Option<BigDecimal>,
        status: String,
        payment_intent_id: Option<String>,
        payment_intent_status: Option<String>,
        payment_method_id: Option<Uuid>,
        payment_method_type: String,
        collective_id: Uuid,
        from_collective_id: Uuid,
        created_by_user_id: Uuid,
        description: Option<String>,
        created_at: chrono::DateTime<chrono::Utc>,
        updated_at: chrono::DateTime<chrono::Utc>,
    }

    impl TryFrom<OrderRow> for Order {
        type Error = DatabaseError;

        fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
            let status = OrderStatus::from_db_status(&row.status).ok_or_else(|| {
                DatabaseError::new(DatabaseErrorKind::Serialization {
                    message: format!("unknown order status: {}", row.status),
                })
            })?;
            let payment_method_type = PaymentMethodType::from_str(&row.payment_method_type)
                .map_err(|e| {
                    DatabaseError::new(DatabaseErrorKind::Serialization {
                        message: e.to_string(),
                    })
                })?;
            let payment_intent = row.payment_intent_id.map(|id| PaymentIntentRef {
                id,
                status: row
                    .payment_intent_status
                    .as_deref()
                    .map(IntentStatus::from_db_status)
                    .unwrap_or(IntentStatus::Unknown),
            });

            Ok(Order {
                id: row.id,
                currency: row.currency,
                total_amount: row.total_amount,
                tax_amount: row.tax_amount,
                platform_tip: row.platform_tip,
                host_fee_percent: row.host_fee_percent,
                status,
                payment_intent,
                payment_method_id: row.payment_method_id,
                payment_method_type,
                collective_id: row.collective_id,
                from_collective_id: row.from_collective_id,
                created_by_user_id: row.created_by_user_id,
                description: row.description,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        }
    }

    /// Queries over the `orders` table. Every function takes an executor so
    /// the same statements run on the pool or inside a transaction.
    pub struct OrderRepository;

    impl OrderRepository {
        pub async fn find_by_id<'e, E: PgExecutor<'e>>(
            executor: E,
            id: Uuid,
        ) -> DatabaseResult<Option<Order>> {
            let row = sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {} FROM orders WHERE id = $1",
                ORDER_COLUMNS
            ))
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            row.map(Order::try_from).transpose()
        }

        pub async fn find_by_status<'e, E: PgExecutor<'e>>(
            executor: E,
            status: OrderStatus,
            limit: i64,
        ) -> DatabaseResult<Vec<Order>> {
            let rows = sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {} FROM orders WHERE status = $1 ORDER BY updated_at ASC LIMIT $2",
                ORDER_COLUMNS
            ))
            .bind(status.to_db_status())
            .bind(limit)
            .fetch_all(executor)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            rows.into_iter().map(Order::try_from).collect()
        }

        pub async fn find_half_settled<'e, E: PgExecutor<'e>>(
            executor: E,
            limit: i64,
        ) -> DatabaseResult<Vec<Order>> {
            let rows = sqlx::query_as::<_, OrderRow>(&format!(
                "SELECT {} FROM orders
                 WHERE status = $1
                   AND EXISTS (
                       SELECT 1 FROM transactions t
                       WHERE t.order_id = orders.id AND t.kind = 'CREDIT' AND NOT t.is_refund
                   )
                 ORDER BY updated_at ASC LIMIT $2",
                ORDER_COLUMNS
            ))
            .bind(OrderStatus::RequireClientConfirmation.to_db_status())
            .bind(limit)
            .fetch_all(executor)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            rows.into_iter().map(Order::try_from).collect()
        }

        pub async fn apply_patch<'e, E: PgExecutor<'e>>(
            executor: E,
            id: Uuid,
            patch: &OrderPatch,
        ) -> DatabaseResult<Order> {
            let row = sqlx::query_as::<_, OrderRow>(&format!(
                "UPDATE orders
                 SET status = COALESCE($2, status),
                     payment_intent_id = COALESCE($3, payment_intent_id),
                     payment_intent_status = COALESCE($4, payment_intent_status),
                     updated_at = NOW()
                 WHERE id = $1
                 RETURNING {}",
                ORDER_COLUMNS
            ))
            .bind(id)
            .bind(patch.status.map(|s| s.to_db_status()))
            .bind(patch.payment_intent.as_ref().map(|i| i.id.clone()))
            .bind(patch.payment_intent.as_ref().map(|i| i.status.as_str()))
            .fetch_optional(executor)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .ok_or_else(|| DatabaseError::not_found("order", id))?;

            Order::try_from(row)
        }

        pub async fn delete<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> DatabaseResult<bool> {
            let result = sqlx::query("DELETE FROM orders WHERE id = $1")
                .bind(id)
                .execute(executor)
                .await
                .map_err(DatabaseError::from_sqlx)?;
            Ok(result.rows_affected() > 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_only_touches_provided_fields() {
        let mut order = Order::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "USD",
            1000,
            PaymentMethodType::Alipay,
        );
        assert_eq!(order.currency, "usd");

        order.apply(&OrderPatch::intent(PaymentIntentRef {
            id: "pi_1".to_string(),
            status: IntentStatus::RequiresAction,
        }));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_intent.as_ref().unwrap().id, "pi_1");

        order.apply(&OrderPatch::status(OrderStatus::RequireClientConfirmation));
        assert_eq!(order.status, OrderStatus::RequireClientConfirmation);
        assert_eq!(order.payment_intent.as_ref().unwrap().id, "pi_1");
    }
}
