use crate::payments::error::PaymentResult;
use crate::payments::types::{
    BalanceTransaction, CreateIntentRequest, PaymentIntent, ProviderName, WebhookEvent,
    WebhookVerificationResult,
};
use async_trait::async_trait;

/// Provider operations needed to settle redirect payments and reconcile refunds.
///
/// Calls that act on behalf of a host take the host's connected account id;
/// `None` targets the platform account.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> PaymentResult<PaymentIntent>;

    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
        connected_account: Option<&str>,
    ) -> PaymentResult<PaymentIntent>;

    async fn retrieve_balance_transaction(
        &self,
        balance_transaction_id: &str,
        connected_account: Option<&str>,
    ) -> PaymentResult<BalanceTransaction>;

    fn name(&self) -> ProviderName;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult>;

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<WebhookEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::{IntentStatus, PaymentMethodType, WebhookPayload};

    struct MockProvider;

    #[async_trait]
    impl PaymentProvider for MockProvider {
        async fn create_payment_intent(
            &self,
            request: CreateIntentRequest,
        ) -> PaymentResult<PaymentIntent> {
            Ok(PaymentIntent {
                id: "pi_mock".to_string(),
                status: IntentStatus::RequiresAction,
                amount: request.amount,
                currency: request.currency,
                client_secret: Some("pi_mock_secret".to_string()),
                next_action_url: Some("https://example.com/alipay".to_string()),
                charges: Vec::new(),
            })
        }

        async fn retrieve_payment_intent(
            &self,
            intent_id: &str,
            _connected_account: Option<&str>,
        ) -> PaymentResult<PaymentIntent> {
            Ok(PaymentIntent {
                id: intent_id.to_string(),
                status: IntentStatus::Succeeded,
                amount: 1000,
                currency: "usd".to_string(),
                client_secret: None,
                next_action_url: None,
                charges: Vec::new(),
            })
        }

        async fn retrieve_balance_transaction(
            &self,
            balance_transaction_id: &str,
            _connected_account: Option<&str>,
        ) -> PaymentResult<BalanceTransaction> {
            Ok(BalanceTransaction {
                id: balance_transaction_id.to_string(),
                amount: 1000,
                currency: "usd".to_string(),
                exchange_rate: None,
                fee: 0,
                fee_details: Vec::new(),
            })
        }

        fn name(&self) -> ProviderName {
            ProviderName::Stripe
        }

        fn verify_webhook(
            &self,
            _payload: &[u8],
            _signature: &str,
        ) -> PaymentResult<WebhookVerificationResult> {
            Ok(WebhookVerificationResult {
                valid: true,
                reason: None,
            })
        }

        fn parse_webhook_event(&self, _payload: &[u8]) -> PaymentResult<WebhookEvent> {
            Ok(WebhookEvent {
                provider: ProviderName::Stripe,
                id: "evt_mock".to_string(),
                event_type: "mock".to_string(),
                account: None,
                created: 0,
                payload: WebhookPayload::Unhandled(serde_json::json!({})),
                received_at: chrono::Utc::now().to_rfc3339(),
            })
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_provider() {
        let provider: Box<dyn PaymentProvider> = Box::new(MockProvider);
        let intent = provider
            .create_payment_intent(CreateIntentRequest {
                amount: 1000,
                currency: "usd".to_string(),
                payment_method_types: vec![PaymentMethodType::Alipay],
                description: None,
                order_reference: "order-1".to_string(),
                connected_account: Some("acct_host".to_string()),
                idempotency_key: None,
            })
            .await
            .unwrap();
        assert_eq!(intent.status, IntentStatus::RequiresAction);

        let fetched = provider
            .retrieve_payment_intent(&intent.id, Some("acct_host"))
            .await
            .unwrap();
        assert_eq!(fetched.id, "pi_mock");
        assert_eq!(provider.name(), ProviderName::Stripe);
    }
}
