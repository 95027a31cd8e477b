use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    Stripe,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Stripe => "stripe",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "stripe" => Ok(ProviderName::Stripe),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported provider: {}", value),
                field: Some("provider".to_string()),
            }),
        }
    }
}

/// Payment method a ledger transaction was funded with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    Card,
    Alipay,
}

impl PaymentMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodType::Card => "card",
            PaymentMethodType::Alipay => "alipay",
        }
    }

    /// Redirect-based methods need the payer to leave and come back before
    /// the intent can settle.
    pub fn requires_redirect(&self) -> bool {
        matches!(self, PaymentMethodType::Alipay)
    }
}

impl fmt::Display for PaymentMethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethodType {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "card" => Ok(PaymentMethodType::Card),
            "alipay" => Ok(PaymentMethodType::Alipay),
            _ => Err(PaymentError::ValidationError {
                message: format!("unsupported payment method: {}", value),
                field: Some("payment_method_type".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::RequiresCapture => "requires_capture",
            IntentStatus::Canceled => "canceled",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Unknown => "unknown",
        }
    }

    pub fn from_db_status(value: &str) -> Self {
        match value {
            "requires_payment_method" => IntentStatus::RequiresPaymentMethod,
            "requires_confirmation" => IntentStatus::RequiresConfirmation,
            "requires_action" => IntentStatus::RequiresAction,
            "processing" => IntentStatus::Processing,
            "requires_capture" => IntentStatus::RequiresCapture,
            "canceled" => IntentStatus::Canceled,
            "succeeded" => IntentStatus::Succeeded,
            _ => IntentStatus::Unknown,
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIntentRequest {
    /// Minor units of `currency`.
    pub amount: i64,
    pub currency: String,
    pub payment_method_types: Vec<PaymentMethodType>,
    pub description: Option<String>,
    /// Opaque order reference stored in the intent metadata.
    pub order_reference: String,
    pub connected_account: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    pub amount: i64,
    pub currency: String,
    pub client_secret: Option<String>,
    pub next_action_url: Option<String>,
    pub charges: Vec<Charge>,
}

impl PaymentIntent {
    pub fn first_charge(&self) -> Option<&Charge> {
        self.charges.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub balance_transaction: Option<String>,
    pub application_fee_amount: Option<i64>,
    pub payment_method_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    StripeFee,
    ApplicationFee,
    Tax,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeeDetail {
    pub amount: i64,
    pub currency: String,
    pub kind: FeeKind,
}

/// Settlement record of a charge or refund, denominated in the account's
/// settlement currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceTransaction {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub exchange_rate: Option<BigDecimal>,
    pub fee: i64,
    pub fee_details: Vec<FeeDetail>,
}

impl BalanceTransaction {
    /// Splits the reported fee details by kind. Amounts are absolute minor units.
    pub fn processor_fees(&self) -> ProcessorFees {
        let mut fees = ProcessorFees::default();
        for detail in &self.fee_details {
            let amount = detail.amount.abs();
            match detail.kind {
                FeeKind::StripeFee => fees.processing_fee += amount,
                FeeKind::ApplicationFee => fees.application_fee += amount,
                FeeKind::Tax => fees.tax += amount,
                FeeKind::Other => fees.other += amount,
            }
        }
        fees
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessorFees {
    pub processing_fee: i64,
    pub application_fee: i64,
    pub tax: i64,
    pub other: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    RequiresAction,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Refund {
    pub id: String,
    pub charge: String,
    pub balance_transaction: Option<String>,
    pub status: RefundStatus,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookVerificationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "object", rename_all = "snake_case")]
pub enum WebhookPayload {
    RefundUpdated(Refund),
    Unhandled(JsonValue),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: ProviderName,
    pub id: String,
    pub event_type: String,
    /// Connected account the event originated from, if any.
    pub account: Option<String>,
    pub created: i64,
    pub payload: WebhookPayload,
    pub received_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_method_parsing_is_case_insensitive() {
        assert_eq!(
            PaymentMethodType::from_str("ALIPAY").unwrap(),
            PaymentMethodType::Alipay
        );
        assert!(PaymentMethodType::from_str("wechat").is_err());
        assert!(PaymentMethodType::Alipay.requires_redirect());
        assert!(!PaymentMethodType::Card.requires_redirect());
    }

    #[test]
    fn unknown_intent_status_does_not_fail_deserialization() {
        let status: IntentStatus = serde_json::from_str("\"requires_source\"").unwrap();
        assert_eq!(status, IntentStatus::Unknown);
        assert_eq!(
            IntentStatus::from_db_status("requires_action"),
            IntentStatus::RequiresAction
        );
    }

    #[test]
    fn processor_fees_are_split_by_kind() {
        let balance = BalanceTransaction {
            id: "txn_1".to_string(),
            amount: 1000,
            currency: "usd".to_string(),
            exchange_rate: None,
            fee: 109,
            fee_details: vec![
                FeeDetail {
                    amount: 59,
                    currency: "usd".to_string(),
                    kind: FeeKind::StripeFee,
                },
                FeeDetail {
                    amount: 50,
                    currency: "usd".to_string(),
                    kind: FeeKind::ApplicationFee,
                },
            ],
        };

        let fees = balance.processor_fees();
        assert_eq!(fees.processing_fee, 59);
        assert_eq!(fees.application_fee, 50);
        assert_eq!(fees.tax, 0);
    }
}
