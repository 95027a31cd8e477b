use crate::database::transaction_data::TransactionData;
use crate::payments::types::PaymentMethodType;
use crate::services::fee_calculation::FeeBreakdown;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Credit,
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "CREDIT",
            TransactionKind::Debit => "DEBIT",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "CREDIT" => Some(TransactionKind::Credit),
            "DEBIT" => Some(TransactionKind::Debit),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable ledger entry. Only `data` and `refund_transaction_id` change
/// after creation, and only once, when the entry is refunded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub is_refund: bool,
    pub description: Option<String>,
    /// Order-native amount and currency.
    pub amount: i64,
    pub currency: String,
    pub host_currency: String,
    pub amount_in_host_currency: i64,
    pub host_currency_fx_rate: BigDecimal,
    /// Set when the fx rate could not be derived and was recorded as 0.
    pub fx_rate_flagged: bool,
    pub payment_processor_fee_in_host_currency: i64,
    pub host_fee_in_host_currency: i64,
    pub platform_fee_in_host_currency: i64,
    pub tax_amount: Option<i64>,
    pub order_id: Option<Uuid>,
    pub collective_id: Uuid,
    pub from_collective_id: Uuid,
    pub host_collective_id: Uuid,
    pub payment_method_id: Option<Uuid>,
    pub payment_method_type: PaymentMethodType,
    pub created_by_user_id: Uuid,
    pub provider_charge_id: Option<String>,
    pub data: TransactionData,
    pub refund_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn fees(&self) -> FeeBreakdown {
        FeeBreakdown {
            processor_fee: self.payment_processor_fee_in_host_currency,
            platform_fee: self.platform_fee_in_host_currency,
            host_fee: self.host_fee_in_host_currency,
        }
    }

    /// What reaches the collective after fees, in host currency.
    pub fn net_amount_in_host_currency(&self) -> i64 {
        self.amount_in_host_currency - self.fees().total()
    }

    pub fn is_settlement(&self) -> bool {
        self.kind == TransactionKind::Credit && !self.is_refund
    }
}

/// Conjunctive lookup criteria; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub is_refund: Option<bool>,
    pub provider_charge_id: Option<String>,
    pub order_id: Option<Uuid>,
}

impl TransactionFilter {
    /// The original credit posted for a provider charge.
    pub fn original_charge(charge_id: &str) -> Self {
        Self {
            kind: Some(TransactionKind::Credit),
            is_refund: Some(false),
            provider_charge_id: Some(charge_id.to_string()),
            order_id: None,
        }
    }

    /// The settlement credit posted for an order.
    pub fn settlement_for_order(order_id: Uuid) -> Self {
        Self {
            kind: Some(TransactionKind::Credit),
            is_refund: Some(false),
            provider_charge_id: None,
            order_id: Some(order_id),
        }
    }

    pub fn matches(&self, transaction: &LedgerTransaction) -> bool {
        self.kind.map_or(true, |k| k == transaction.kind)
            && self.is_refund.map_or(true, |r| r == transaction.is_refund)
            && self
                .provider_charge_id
                .as_deref()
                .map_or(true, |c| transaction.provider_charge_id.as_deref() == Some(c))
            && self.order_id.map_or(true, |o| transaction.order_id == Some(o))
    }
}

#[cfg(feature = "database")]
pub use pg::TransactionRepository;

#[cfg(feature = "database")]
mod pg {
    use super::{LedgerTransaction, TransactionFilter, TransactionKind};
    use crate::database::error::{DatabaseError, DatabaseErrorKind, DatabaseResult};
    use crate::database::transaction_data::TransactionData;
    use crate::payments::types::PaymentMethodType;
    use sqlx::{types::BigDecimal, FromRow, PgExecutor};
    use std::str::FromStr;
    use uuid::Uuid;

    const TRANSACTION_COLUMNS: &str = "id, kind, is_refund, description, amount, currency, \
         host_currency, amount_in_host_currency, host_currency_fx_rate, fx_rate_flagged, \
         payment_processor_fee_in_host_currency, host_fee_in_host_currency, \
         platform_fee_in_host_currency, tax_amount, order_id, collective_id, \
         from_collective_id, host_collective_id, payment_method_id, payment_method_type, \
         created_by_user_id, provider_charge_id, data, refund_transaction_id, created_at";

    #[derive(Debug, Clone, FromRow)]
    struct TransactionRow {
        id: Uuid,
        kind: String,
        is_refund: bool,
        description: Option<String>,
        amount: i64,
        currency: String,
        host_currency: String,
        amount_in_host_currency: i64,
        host_currency_fx_rate: BigDecimal,
        fx_rate_flagged: bool,
        payment_processor_fee_in_host_currency: i64,
        host_fee_in_host_currency: i64,
        platform_fee_in_host_currency: i64,
        tax_amount: Option<i64>,
        order_id: Option<Uuid>,
        collective_id: Uuid,
        from_collective_id: Uuid,
        host_collective_id: Uuid,
        payment_method_id: Option<Uuid>,
        payment_method_type: String,
        created_by_user_id: Uuid,
        provider_charge_id: Option<String>,
        data: serde_json::Value,
        refund_transaction_id: Option<Uuid>,
        created_at: chrono::DateTime<chrono::Utc>,
    }

    fn decode_error(message: String) -> DatabaseError {
        DatabaseError::new(DatabaseErrorKind::Serialization { message })
    }

    impl TryFrom<TransactionRow> for LedgerTransaction {
        type Error = DatabaseError;

        fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
            let kind = TransactionKind::from_db(&row.kind)
                .ok_or_else(|| decode_error(format!("unknown transaction kind: {}", row.kind)))?;
            let payment_method_type = PaymentMethodType::from_str(&row.payment_method_type)
                .map_err(|e| decode_error(e.to_string()))?;
            let data: TransactionData =
                serde_json::from_value(row.data).map_err(DatabaseError::serialization)?;

            Ok(LedgerTransaction {
                id: row.id,
                kind,
                is_refund: row.is_refund,
                description: row.description,
                amount: row.amount,
                currency: row.currency,
                host_currency: row.host_currency,
                amount_in_host_currency: row.amount_in_host_currency,
                host_currency_fx_rate: row.host_currency_fx_rate,
                fx_rate_flagged: row.fx_rate_flagged,
                payment_processor_fee_in_host_currency: row
                    .payment_processor_fee_in_host_currency,
                host_fee_in_host_currency: row.host_fee_in_host_currency,
                platform_fee_in_host_currency: row.platform_fee_in_host_currency,
                tax_amount: row.tax_amount,
                order_id: row.order_id,
                collective_id: row.collective_id,
                from_collective_id: row.from_collective_id,
                host_collective_id: row.host_collective_id,
                payment_method_id: row.payment_method_id,
                payment_method_type,
                created_by_user_id: row.created_by_user_id,
                provider_charge_id: row.provider_charge_id,
                data,
                refund_transaction_id: row.refund_transaction_id,
                created_at: row.created_at,
            })
        }
    }

    /// Queries over the `transactions` table.
    pub struct TransactionRepository;

    impl TransactionRepository {
        pub async fn insert<'e, E: PgExecutor<'e>>(
            executor: E,
            tx: &LedgerTransaction,
        ) -> DatabaseResult<LedgerTransaction> {
            let data = serde_json::to_value(&tx.data).map_err(DatabaseError::serialization)?;

            let row = sqlx::query_as::<_, TransactionRow>(&format!(
                "INSERT INTO transactions
                 (id, kind, is_refund, description, amount, currency, host_currency,
                  amount_in_host_currency, host_currency_fx_rate, fx_rate_flagged,
                  payment_processor_fee_in_host_currency, host_fee_in_host_currency,
                  platform_fee_in_host_currency, tax_amount, order_id, collective_id,
                  from_collective_id, host_collective_id, payment_method_id,
                  payment_method_type, created_by_user_id, provider_charge_id, data,
                  refund_transaction_id, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                         $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
                 RETURNING {}",
                TRANSACTION_COLUMNS
            ))
            .bind(tx.id)
            .bind(tx.kind.as_str())
            .bind(tx.is_refund)
            .bind(tx.description.clone())
            .bind(tx.amount)
            .bind(tx.currency.clone())
            .bind(tx.host_currency.clone())
            .bind(tx.amount_in_host_currency)
            .bind(tx.host_currency_fx_rate.clone())
            .bind(tx.fx_rate_flagged)
            .bind(tx.payment_processor_fee_in_host_currency)
            .bind(tx.host_fee_in_host_currency)
            .bind(tx.platform_fee_in_host_currency)
            .bind(tx.tax_amount)
            .bind(tx.order_id)
            .bind(tx.collective_id)
            .bind(tx.from_collective_id)
            .bind(tx.host_collective_id)
            .bind(tx.payment_method_id)
            .bind(tx.payment_method_type.as_str())
            .bind(tx.created_by_user_id)
            .bind(tx.provider_charge_id.clone())
            .bind(data)
            .bind(tx.refund_transaction_id)
            .bind(tx.created_at)
            .fetch_one(executor)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            LedgerTransaction::try_from(row)
        }

        pub async fn find_one<'e, E: PgExecutor<'e>>(
            executor: E,
            filter: &TransactionFilter,
        ) -> DatabaseResult<Option<LedgerTransaction>> {
            let row = sqlx::query_as::<_, TransactionRow>(&format!(
                "SELECT {} FROM transactions
                 WHERE ($1::TEXT IS NULL OR kind = $1)
                   AND ($2::BOOL IS NULL OR is_refund = $2)
                   AND ($3::TEXT IS NULL OR provider_charge_id = $3)
                   AND ($4::UUID IS NULL OR order_id = $4)
                 ORDER BY created_at ASC
                 LIMIT 1",
                TRANSACTION_COLUMNS
            ))
            .bind(filter.kind.map(|k| k.as_str()))
            .bind(filter.is_refund)
            .bind(filter.provider_charge_id.clone())
            .bind(filter.order_id)
            .fetch_optional(executor)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            row.map(LedgerTransaction::try_from).transpose()
        }

        pub async fn update_data<'e, E: PgExecutor<'e>>(
            executor: E,
            id: Uuid,
            data: &TransactionData,
        ) -> DatabaseResult<LedgerTransaction> {
            let data = serde_json::to_value(data).map_err(DatabaseError::serialization)?;

            let row = sqlx::query_as::<_, TransactionRow>(&format!(
                "UPDATE transactions SET data = $2 WHERE id = $1 RETURNING {}",
                TRANSACTION_COLUMNS
            ))
            .bind(id)
            .bind(data)
            .fetch_optional(executor)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .ok_or_else(|| DatabaseError::not_found("transaction", id))?;

            LedgerTransaction::try_from(row)
        }

        /// Sets `refund_transaction_id` only while it is still empty.
        pub async fn link_refund<'e, E: PgExecutor<'e>>(
            executor: E,
            id: Uuid,
            refund_transaction_id: Uuid,
        ) -> DatabaseResult<()> {
            let result = sqlx::query(
                "UPDATE transactions
                 SET refund_transaction_id = $2
                 WHERE id = $1 AND refund_transaction_id IS NULL",
            )
            .bind(id)
            .bind(refund_transaction_id)
            .execute(executor)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(DatabaseError::conflict(format!(
                    "transaction {} is already linked to a refund",
                    id
                )));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::transaction_data::StripeSettlementV1;

    fn transaction(charge: &str, is_refund: bool) -> LedgerTransaction {
        LedgerTransaction {
            id: Uuid::new_v4(),
            kind: TransactionKind::Credit,
            is_refund,
            description: None,
            amount: 1000,
            currency: "usd".to_string(),
            host_currency: "USD".to_string(),
            amount_in_host_currency: 1000,
            host_currency_fx_rate: BigDecimal::from(1),
            fx_rate_flagged: false,
            payment_processor_fee_in_host_currency: 59,
            host_fee_in_host_currency: 50,
            platform_fee_in_host_currency: 0,
            tax_amount: None,
            order_id: Some(Uuid::new_v4()),
            collective_id: Uuid::new_v4(),
            from_collective_id: Uuid::new_v4(),
            host_collective_id: Uuid::new_v4(),
            payment_method_id: None,
            payment_method_type: PaymentMethodType::Alipay,
            created_by_user_id: Uuid::new_v4(),
            provider_charge_id: Some(charge.to_string()),
            data: TransactionData::Stripe(StripeSettlementV1 {
                charge_id: charge.to_string(),
                payment_intent_id: "pi_1".to_string(),
                balance_transaction_id: "txn_1".to_string(),
                settlement_amount: 1000,
                settlement_currency: "usd".to_string(),
                provider_exchange_rate: None,
                fee_details: Vec::new(),
                application_fee_amount: None,
                refund: None,
            }),
            refund_transaction_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn original_charge_filter_skips_refunds() {
        let filter = TransactionFilter::original_charge("ch_1");
        assert!(filter.matches(&transaction("ch_1", false)));
        assert!(!filter.matches(&transaction("ch_1", true)));
        assert!(!filter.matches(&transaction("ch_2", false)));
    }

    #[test]
    fn net_amount_subtracts_all_fees() {
        let tx = transaction("ch_1", false);
        assert_eq!(tx.net_amount_in_host_currency(), 891);
        assert!(tx.is_settlement());
    }
}
