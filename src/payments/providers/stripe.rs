use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentProvider;
use crate::payments::types::{
    BalanceTransaction, Charge, CreateIntentRequest, FeeDetail, FeeKind, IntentStatus,
    PaymentIntent, ProviderName, Refund, RefundStatus, WebhookEvent, WebhookPayload,
    WebhookVerificationResult,
};
use crate::payments::utils::{hmac_sha256_hex, secure_eq, PaymentHttpClient, ProviderRequest};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, FromPrimitive};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

/// API version whose payment intent payload still embeds the `charges` list.
pub const STRIPE_API_VERSION: &str = "2020-08-27";

pub const REFUND_UPDATED_EVENT: &str = "charge.refund.updated";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Maximum age of a signed webhook delivery.
    pub webhook_tolerance_secs: i64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: None,
            base_url: "https://api.stripe.com".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            webhook_tolerance_secs: 300,
        }
    }
}

impl StripeConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let secret_key =
            std::env::var("STRIPE_SECRET_KEY").map_err(|_| PaymentError::ValidationError {
                message: "STRIPE_SECRET_KEY environment variable is required".to_string(),
                field: Some("STRIPE_SECRET_KEY".to_string()),
            })?;

        Ok(Self {
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
            base_url: std::env::var("STRIPE_BASE_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            timeout_secs: std::env::var("STRIPE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("STRIPE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            webhook_tolerance_secs: std::env::var("STRIPE_WEBHOOK_TOLERANCE_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(300),
            secret_key,
        })
    }
}

pub struct StripeProvider {
    config: StripeConfig,
    http: PaymentHttpClient,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            ProviderName::Stripe.as_str(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn headers<'a>(
        connected_account: Option<&'a str>,
        idempotency_key: Option<&'a str>,
    ) -> Vec<(&'static str, &'a str)> {
        let mut headers = vec![("Stripe-Version", STRIPE_API_VERSION)];
        if let Some(account) = connected_account {
            headers.push(("Stripe-Account", account));
        }
        if let Some(key) = idempotency_key {
            headers.push(("Idempotency-Key", key));
        }
        headers
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        connected_account: Option<&str>,
    ) -> PaymentResult<T> {
        let request = ProviderRequest::get(self.endpoint(path))
            .bearer(&self.config.secret_key)
            .headers(Self::headers(connected_account, None));
        self.http.send(&request).await
    }

    /// Checks a `Stripe-Signature` header against the payload as of `now`
    /// (unix seconds).
    pub fn verify_signature_at(
        &self,
        payload: &[u8],
        header: &str,
        now: i64,
    ) -> WebhookVerificationResult {
        let Some(secret) = self.config.webhook_secret.as_deref() else {
            return rejected("webhook secret is not configured");
        };
        let Some(signature) = SignatureHeader::parse(header) else {
            return rejected("malformed stripe signature header");
        };

        if (now - signature.timestamp).abs() > self.config.webhook_tolerance_secs {
            return rejected("stripe signature timestamp outside tolerance");
        }

        let mut signed = signature.timestamp.to_string().into_bytes();
        signed.push(b'.');
        signed.extend_from_slice(payload);
        let Some(expected) = hmac_sha256_hex(&signed, secret) else {
            return rejected("invalid webhook secret");
        };

        let valid = signature
            .v1
            .iter()
            .any(|candidate| secure_eq(expected.as_bytes(), candidate.as_bytes()));
        if valid {
            WebhookVerificationResult {
                valid: true,
                reason: None,
            }
        } else {
            rejected("invalid stripe signature")
        }
    }
}

fn rejected(reason: &str) -> WebhookVerificationResult {
    WebhookVerificationResult {
        valid: false,
        reason: Some(reason.to_string()),
    }
}

struct SignatureHeader<'a> {
    timestamp: i64,
    v1: Vec<&'a str>,
}

impl<'a> SignatureHeader<'a> {
    fn parse(header: &'a str) -> Option<Self> {
        let mut timestamp = None;
        let mut v1 = Vec::new();
        for part in header.split(',') {
            let (key, value) = part.trim().split_once('=')?;
            match key {
                "t" => timestamp = value.parse::<i64>().ok(),
                "v1" => v1.push(value),
                _ => {}
            }
        }
        if v1.is_empty() {
            return None;
        }
        Some(Self {
            timestamp: timestamp?,
            v1,
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> PaymentResult<PaymentIntent> {
        if request.amount <= 0 {
            return Err(PaymentError::ValidationError {
                message: "amount must be greater than zero".to_string(),
                field: Some("amount".to_string()),
            });
        }

        let mut form = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
            (
                "metadata[order_id]".to_string(),
                request.order_reference.clone(),
            ),
        ];
        for method in &request.payment_method_types {
            form.push((
                "payment_method_types[]".to_string(),
                method.as_str().to_string(),
            ));
        }
        if let Some(description) = &request.description {
            form.push(("description".to_string(), description.clone()));
        }

        let call = ProviderRequest::post(self.endpoint("/v1/payment_intents"))
            .bearer(&self.config.secret_key)
            .headers(Self::headers(
                request.connected_account.as_deref(),
                request.idempotency_key.as_deref(),
            ))
            .form(&form);
        let raw: StripePaymentIntent = self.http.send(&call).await?;

        info!(
            intent_id = %raw.id,
            order_reference = %request.order_reference,
            status = ?raw.status,
            "stripe payment intent created"
        );
        Ok(raw.into())
    }

    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
        connected_account: Option<&str>,
    ) -> PaymentResult<PaymentIntent> {
        if intent_id.trim().is_empty() {
            return Err(PaymentError::ValidationError {
                message: "payment intent id is required".to_string(),
                field: Some("payment_intent".to_string()),
            });
        }
        let raw: StripePaymentIntent = self
            .get(&format!("/v1/payment_intents/{}", intent_id), connected_account)
            .await?;
        Ok(raw.into())
    }

    async fn retrieve_balance_transaction(
        &self,
        balance_transaction_id: &str,
        connected_account: Option<&str>,
    ) -> PaymentResult<BalanceTransaction> {
        let raw: StripeBalanceTransaction = self
            .get(
                &format!("/v1/balance_transactions/{}", balance_transaction_id),
                connected_account,
            )
            .await?;
        Ok(raw.into())
    }

    fn name(&self) -> ProviderName {
        ProviderName::Stripe
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        let result = self.verify_signature_at(payload, signature, chrono::Utc::now().timestamp());
        if let Some(reason) = &result.reason {
            warn!(reason = %reason, "stripe webhook signature rejected");
        }
        Ok(result)
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent> {
        let raw: StripeEvent =
            serde_json::from_slice(payload).map_err(|e| PaymentError::WebhookParseError {
                message: format!("invalid webhook JSON payload: {}", e),
            })?;

        let payload = if raw.event_type == REFUND_UPDATED_EVENT {
            let refund: StripeRefund = serde_json::from_value(raw.data.object).map_err(|e| {
                PaymentError::WebhookParseError {
                    message: format!("invalid refund object: {}", e),
                }
            })?;
            WebhookPayload::RefundUpdated(refund.into())
        } else {
            WebhookPayload::Unhandled(raw.data.object)
        };

        Ok(WebhookEvent {
            provider: ProviderName::Stripe,
            id: raw.id,
            event_type: raw.event_type,
            account: raw.account,
            created: raw.created,
            payload,
            received_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Stripe fields that are either an id or the expanded object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeRedirect {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeNextAction {
    redirect_to_url: Option<StripeRedirect>,
    alipay_handle_redirect: Option<StripeRedirect>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentMethodDetails {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeCharge {
    id: String,
    amount: i64,
    currency: String,
    status: String,
    balance_transaction: Option<Expandable>,
    application_fee_amount: Option<i64>,
    payment_method_details: Option<StripePaymentMethodDetails>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: IntentStatus,
    amount: i64,
    currency: String,
    client_secret: Option<String>,
    next_action: Option<StripeNextAction>,
    charges: Option<StripeList<StripeCharge>>,
}

impl From<StripePaymentIntent> for PaymentIntent {
    fn from(raw: StripePaymentIntent) -> Self {
        let next_action_url = raw.next_action.and_then(|action| {
            action
                .alipay_handle_redirect
                .and_then(|r| r.url)
                .or_else(|| action.redirect_to_url.and_then(|r| r.url))
        });
        let charges = raw
            .charges
            .map(|list| list.data)
            .unwrap_or_default()
            .into_iter()
            .map(|c| Charge {
                id: c.id,
                amount: c.amount,
                currency: c.currency,
                status: c.status,
                balance_transaction: c.balance_transaction.map(Expandable::into_id),
                application_fee_amount: c.application_fee_amount,
                payment_method_type: c.payment_method_details.and_then(|d| d.kind),
            })
            .collect();

        PaymentIntent {
            id: raw.id,
            status: raw.status,
            amount: raw.amount,
            currency: raw.currency,
            client_secret: raw.client_secret,
            next_action_url,
            charges,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeFeeDetail {
    amount: i64,
    currency: String,
    #[serde(rename = "type")]
    kind: FeeKind,
}

#[derive(Debug, Deserialize)]
struct StripeBalanceTransaction {
    id: String,
    amount: i64,
    currency: String,
    exchange_rate: Option<f64>,
    fee: i64,
    #[serde(default)]
    fee_details: Vec<StripeFeeDetail>,
}

impl From<StripeBalanceTransaction> for BalanceTransaction {
    fn from(raw: StripeBalanceTransaction) -> Self {
        BalanceTransaction {
            id: raw.id,
            amount: raw.amount,
            currency: raw.currency,
            exchange_rate: raw.exchange_rate.and_then(BigDecimal::from_f64),
            fee: raw.fee,
            fee_details: raw
                .fee_details
                .into_iter()
                .map(|d| FeeDetail {
                    amount: d.amount,
                    currency: d.currency,
                    kind: d.kind,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    amount: i64,
    currency: String,
    status: RefundStatus,
    charge: Expandable,
    balance_transaction: Option<Expandable>,
}

impl From<StripeRefund> for Refund {
    fn from(raw: StripeRefund) -> Self {
        Refund {
            id: raw.id,
            charge: raw.charge.into_id(),
            balance_transaction: raw.balance_transaction.map(Expandable::into_id),
            status: raw.status,
            amount: raw.amount,
            currency: raw.currency,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: JsonValue,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    account: Option<String>,
    #[serde(default)]
    created: i64,
    data: StripeEventData,
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn provider() -> StripeProvider {
        StripeProvider::new(StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: Some("whsec_test".to_string()),
            base_url: "https://api.stripe.com".to_string(),
            timeout_secs: 5,
            max_retries: 1,
            webhook_tolerance_secs: 300,
        })
        .expect("provider init should succeed")
    }

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut signed = timestamp.to_string().into_bytes();
        signed.push(b'.');
        signed.extend_from_slice(payload);
        format!(
            "t={},v1={}",
            timestamp,
            hmac_sha256_hex(&signed, secret).unwrap()
        )
    }

    #[test]
    fn webhook_signature_validation_accepts_valid_signature() {
        let payload = br#"{"type":"charge.refund.updated"}"#;
        let header = sign(payload, "whsec_test", NOW);
        let result = provider().verify_signature_at(payload, &header, NOW + 10);
        assert!(result.valid, "{:?}", result.reason);
    }

    #[test]
    fn webhook_signature_validation_rejects_wrong_secret() {
        let payload = br#"{"type":"charge.refund.updated"}"#;
        let header = sign(payload, "whsec_other", NOW);
        let result = provider().verify_signature_at(payload, &header, NOW);
        assert!(!result.valid);
    }

    #[test]
    fn webhook_signature_validation_rejects_stale_timestamp() {
        let payload = br#"{"type":"charge.refund.updated"}"#;
        let header = sign(payload, "whsec_test", NOW - 301);
        let result = provider().verify_signature_at(payload, &header, NOW);
        assert!(!result.valid);
        assert!(result.reason.unwrap().contains("tolerance"));
    }

    #[test]
    fn webhook_signature_validation_rejects_malformed_header() {
        let result = provider().verify_signature_at(b"{}", "invalid_signature", NOW);
        assert!(!result.valid);
    }

    #[test]
    fn any_matching_v1_signature_is_accepted() {
        let payload = br#"{"id":"evt_1"}"#;
        let good = sign(payload, "whsec_test", NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1=deadbeef,v1={}", NOW, good_sig);
        assert!(provider().verify_signature_at(payload, &header, NOW).valid);
    }

    #[test]
    fn payment_intent_payload_is_mapped() {
        let raw: StripePaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_123",
            "object": "payment_intent",
            "status": "succeeded",
            "amount": 1000,
            "currency": "usd",
            "client_secret": "pi_123_secret_abc",
            "next_action": null,
            "charges": {
                "object": "list",
                "data": [{
                    "id": "ch_123",
                    "amount": 1000,
                    "currency": "usd",
                    "status": "succeeded",
                    "balance_transaction": "txn_123",
                    "application_fee_amount": 50,
                    "payment_method_details": { "type": "alipay", "alipay": {} }
                }]
            }
        }))
        .unwrap();

        let intent: PaymentIntent = raw.into();
        assert_eq!(intent.status, IntentStatus::Succeeded);
        let charge = intent.first_charge().unwrap();
        assert_eq!(charge.balance_transaction.as_deref(), Some("txn_123"));
        assert_eq!(charge.application_fee_amount, Some(50));
        assert_eq!(charge.payment_method_type.as_deref(), Some("alipay"));
    }

    #[test]
    fn alipay_redirect_url_is_extracted() {
        let raw: StripePaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_456",
            "status": "requires_action",
            "amount": 500,
            "currency": "eur",
            "client_secret": "pi_456_secret",
            "next_action": {
                "type": "alipay_handle_redirect",
                "alipay_handle_redirect": { "url": "https://hooks.stripe.com/alipay/pi_456" }
            }
        }))
        .unwrap();

        let intent: PaymentIntent = raw.into();
        assert_eq!(intent.status, IntentStatus::RequiresAction);
        assert!(intent.charges.is_empty());
        assert_eq!(
            intent.next_action_url.as_deref(),
            Some("https://hooks.stripe.com/alipay/pi_456")
        );
    }

    #[test]
    fn balance_transaction_payload_is_mapped() {
        let raw: StripeBalanceTransaction = serde_json::from_value(serde_json::json!({
            "id": "txn_123",
            "amount": 1371,
            "currency": "usd",
            "exchange_rate": 1.371,
            "fee": 70,
            "fee_details": [
                { "amount": 70, "currency": "usd", "type": "stripe_fee", "description": "Stripe processing fees" }
            ]
        }))
        .unwrap();

        let balance: BalanceTransaction = raw.into();
        assert_eq!(balance.amount, 1371);
        assert!(balance.exchange_rate.is_some());
        assert_eq!(balance.processor_fees().processing_fee, 70);
    }

    #[test]
    fn refund_event_is_parsed() {
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "charge.refund.updated",
            "account": "acct_host",
            "created": NOW,
            "data": {
                "object": {
                    "id": "re_1",
                    "object": "refund",
                    "amount": 1000,
                    "currency": "usd",
                    "status": "succeeded",
                    "charge": "ch_123",
                    "balance_transaction": "txn_re_1"
                }
            }
        });
        let event = provider()
            .parse_webhook_event(payload.to_string().as_bytes())
            .unwrap();

        assert_eq!(event.account.as_deref(), Some("acct_host"));
        match event.payload {
            WebhookPayload::RefundUpdated(refund) => {
                assert_eq!(refund.charge, "ch_123");
                assert_eq!(refund.status, RefundStatus::Succeeded);
                assert_eq!(refund.balance_transaction.as_deref(), Some("txn_re_1"));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn other_events_are_left_unhandled() {
        let payload = br#"{"id":"evt_2","type":"charge.succeeded","data":{"object":{"id":"ch_1"}}}"#;
        let event = provider().parse_webhook_event(payload).unwrap();
        assert!(matches!(event.payload, WebhookPayload::Unhandled(_)));
    }

    #[test]
    fn malformed_event_is_rejected() {
        assert!(matches!(
            provider().parse_webhook_event(b"not json"),
            Err(PaymentError::WebhookParseError { .. })
        ));
    }
}
