//! Provider facts stored next to a ledger transaction.
//!
//! Stored as JSONB; the tag carries the schema version so old rows keep
//! decoding after the payload grows.

use crate::payments::types::{BalanceTransaction, Charge, FeeDetail, PaymentIntent, Refund};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", content = "payload")]
pub enum TransactionData {
    #[serde(rename = "stripe.v1")]
    Stripe(StripeSettlementV1),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeSettlementV1 {
    pub charge_id: String,
    pub payment_intent_id: String,
    pub balance_transaction_id: String,
    /// Settled amount in the connected account's currency.
    pub settlement_amount: i64,
    pub settlement_currency: String,
    /// Rate reported by the provider; kept for audit only.
    pub provider_exchange_rate: Option<BigDecimal>,
    pub fee_details: Vec<FeeDetail>,
    pub application_fee_amount: Option<i64>,
    pub refund: Option<StripeRefundV1>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeRefundV1 {
    pub refund_id: String,
    pub balance_transaction_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub processor_fee: i64,
    pub fee_details: Vec<FeeDetail>,
}

impl StripeSettlementV1 {
    pub fn from_settlement(
        intent: &PaymentIntent,
        charge: &Charge,
        balance: &BalanceTransaction,
    ) -> Self {
        Self {
            charge_id: charge.id.clone(),
            payment_intent_id: intent.id.clone(),
            balance_transaction_id: balance.id.clone(),
            settlement_amount: balance.amount,
            settlement_currency: balance.currency.clone(),
            provider_exchange_rate: balance.exchange_rate.clone(),
            fee_details: balance.fee_details.clone(),
            application_fee_amount: charge.application_fee_amount,
            refund: None,
        }
    }
}

impl StripeRefundV1 {
    pub fn from_refund(refund: &Refund, balance: Option<&BalanceTransaction>) -> Self {
        Self {
            refund_id: refund.id.clone(),
            balance_transaction_id: refund.balance_transaction.clone(),
            amount: refund.amount,
            currency: refund.currency.clone(),
            processor_fee: balance
                .map(|b| b.processor_fees().processing_fee)
                .unwrap_or(0),
            fee_details: balance.map(|b| b.fee_details.clone()).unwrap_or_default(),
        }
    }
}

impl TransactionData {
    pub fn charge_id(&self) -> &str {
        match self {
            TransactionData::Stripe(data) => &data.charge_id,
        }
    }

    pub fn refund(&self) -> Option<&StripeRefundV1> {
        match self {
            TransactionData::Stripe(data) => data.refund.as_ref(),
        }
    }

    pub fn with_refund(&self, refund: StripeRefundV1) -> Self {
        match self {
            TransactionData::Stripe(data) => TransactionData::Stripe(StripeSettlementV1 {
                refund: Some(refund),
                ..data.clone()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settlement() -> TransactionData {
        TransactionData::Stripe(StripeSettlementV1 {
            charge_id: "ch_1".to_string(),
            payment_intent_id: "pi_1".to_string(),
            balance_transaction_id: "txn_1".to_string(),
            settlement_amount: 1000,
            settlement_currency: "usd".to_string(),
            provider_exchange_rate: None,
            fee_details: Vec::new(),
            application_fee_amount: Some(50),
            refund: None,
        })
    }

    #[test]
    fn stored_json_carries_schema_tag() {
        let json = serde_json::to_value(settlement()).unwrap();
        assert_eq!(json["schema"], "stripe.v1");
        assert_eq!(json["payload"]["charge_id"], "ch_1");
    }

    #[test]
    fn attaching_refund_keeps_settlement_facts() {
        let data = settlement().with_refund(StripeRefundV1 {
            refund_id: "re_1".to_string(),
            balance_transaction_id: Some("txn_re_1".to_string()),
            amount: 1000,
            currency: "usd".to_string(),
            processor_fee: 0,
            fee_details: Vec::new(),
        });
        assert_eq!(data.charge_id(), "ch_1");
        assert_eq!(data.refund().unwrap().refund_id, "re_1");
    }
}
