#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use redirect_settlement::database::host_repository::HostAccount;
use redirect_settlement::database::memory::InMemoryLedgerStore;
use redirect_settlement::database::order_repository::Order;
use redirect_settlement::payments::error::{PaymentError, PaymentResult};
use redirect_settlement::payments::provider::PaymentProvider;
use redirect_settlement::payments::types::{
    BalanceTransaction, Charge, CreateIntentRequest, FeeDetail, FeeKind, IntentStatus,
    PaymentIntent, PaymentMethodType, ProviderName, WebhookEvent, WebhookVerificationResult,
};
use redirect_settlement::services::order_state::OrderStatus;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub const HOST_ACCOUNT: &str = "acct_host_1";

/// Provider double that serves canned intents and balance transactions.
pub struct ScriptedProvider {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    balances: Mutex<HashMap<String, BalanceTransaction>>,
    create_status: Mutex<IntentStatus>,
    create_requests: Mutex<Vec<CreateIntentRequest>>,
    retrievals: AtomicUsize,
    unavailable: AtomicBool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            intents: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            create_status: Mutex::new(IntentStatus::RequiresAction),
            create_requests: Mutex::new(Vec::new()),
            retrievals: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn insert_intent(&self, intent: PaymentIntent) {
        self.intents
            .lock()
            .unwrap()
            .insert(intent.id.clone(), intent);
    }

    pub fn insert_balance(&self, balance: BalanceTransaction) {
        self.balances
            .lock()
            .unwrap()
            .insert(balance.id.clone(), balance);
    }

    pub fn set_create_status(&self, status: IntentStatus) {
        *self.create_status.lock().unwrap() = status;
    }

    pub fn set_intent_status(&self, intent_id: &str, status: IntentStatus) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(intent_id) {
            intent.status = status;
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn create_requests(&self) -> Vec<CreateIntentRequest> {
        self.create_requests.lock().unwrap().clone()
    }

    pub fn retrievals(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> PaymentResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::NetworkError {
                message: "connection reset".to_string(),
            });
        }
        Ok(())
    }

    fn missing(kind: &str, id: &str) -> PaymentError {
        PaymentError::ProviderError {
            provider: "stripe".to_string(),
            message: format!("No such {}: '{}'", kind, id),
            provider_code: Some("resource_missing".to_string()),
            retryable: false,
        }
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn create_payment_intent(
        &self,
        request: CreateIntentRequest,
    ) -> PaymentResult<PaymentIntent> {
        self.check_available()?;
        let mut requests = self.create_requests.lock().unwrap();
        requests.push(request.clone());
        let intent = PaymentIntent {
            id: format!("pi_scripted_{}", requests.len()),
            status: *self.create_status.lock().unwrap(),
            amount: request.amount,
            currency: request.currency,
            client_secret: Some(format!("pi_scripted_{}_secret", requests.len())),
            next_action_url: Some("https://hooks.stripe.test/alipay/redirect".to_string()),
            charges: Vec::new(),
        };
        self.insert_intent(intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(
        &self,
        intent_id: &str,
        _connected_account: Option<&str>,
    ) -> PaymentResult<PaymentIntent> {
        self.check_available()?;
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| Self::missing("payment_intent", intent_id))
    }

    async fn retrieve_balance_transaction(
        &self,
        balance_transaction_id: &str,
        _connected_account: Option<&str>,
    ) -> PaymentResult<BalanceTransaction> {
        self.check_available()?;
        self.balances
            .lock()
            .unwrap()
            .get(balance_transaction_id)
            .cloned()
            .ok_or_else(|| Self::missing("balance_transaction", balance_transaction_id))
    }

    fn name(&self) -> ProviderName {
        ProviderName::Stripe
    }

    fn verify_webhook(
        &self,
        _payload: &[u8],
        signature: &str,
    ) -> PaymentResult<WebhookVerificationResult> {
        Ok(WebhookVerificationResult {
            valid: signature == "valid",
            reason: None,
        })
    }

    fn parse_webhook_event(&self, _payload: &[u8]) -> PaymentResult<WebhookEvent> {
        Err(PaymentError::WebhookParseError {
            message: "scripted provider does not parse webhooks".to_string(),
        })
    }
}

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

pub fn host_account(collective_id: Uuid, connected: bool, shared_revenue: bool) -> HostAccount {
    HostAccount {
        collective_id,
        host_collective_id: Uuid::new_v4(),
        currency: "USD".to_string(),
        connected_account_id: connected.then(|| HOST_ACCOUNT.to_string()),
        host_fee_percent: dec("5"),
        host_fee_share_percent: shared_revenue.then(|| dec("15")),
    }
}

pub fn order(currency: &str, total_amount: i64) -> Order {
    let mut order = Order::pending(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        currency,
        total_amount,
        PaymentMethodType::Alipay,
    );
    order.description = Some("Monthly contribution".to_string());
    order
}

pub fn awaiting_order(currency: &str, total_amount: i64, intent_id: &str) -> Order {
    let mut order = order(currency, total_amount);
    order.status = OrderStatus::RequireClientConfirmation;
    order.payment_intent = Some(redirect_settlement::database::order_repository::PaymentIntentRef {
        id: intent_id.to_string(),
        status: IntentStatus::RequiresAction,
    });
    order
}

pub fn succeeded_intent(id: &str, charge_id: &str, balance_id: &str, amount: i64, currency: &str) -> PaymentIntent {
    PaymentIntent {
        id: id.to_string(),
        status: IntentStatus::Succeeded,
        amount,
        currency: currency.to_string(),
        client_secret: None,
        next_action_url: None,
        charges: vec![Charge {
            id: charge_id.to_string(),
            amount,
            currency: currency.to_string(),
            status: "succeeded".to_string(),
            balance_transaction: Some(balance_id.to_string()),
            application_fee_amount: Some(50),
            payment_method_type: Some("alipay".to_string()),
        }],
    }
}

/// Intent the payer walked away from: no charge was made.
pub fn abandoned_intent(id: &str, amount: i64, currency: &str) -> PaymentIntent {
    let mut intent = succeeded_intent(id, "ch_unused", "txn_unused", amount, currency);
    intent.status = IntentStatus::RequiresPaymentMethod;
    intent.charges.clear();
    intent
}

pub fn balance(id: &str, amount: i64, currency: &str, stripe_fee: i64, application_fee: i64) -> BalanceTransaction {
    let mut fee_details = vec![FeeDetail {
        amount: stripe_fee,
        currency: currency.to_string(),
        kind: FeeKind::StripeFee,
    }];
    if application_fee > 0 {
        fee_details.push(FeeDetail {
            amount: application_fee,
            currency: currency.to_string(),
            kind: FeeKind::ApplicationFee,
        });
    }
    BalanceTransaction {
        id: id.to_string(),
        amount,
        currency: currency.to_string(),
        exchange_rate: None,
        fee: stripe_fee + application_fee,
        fee_details,
    }
}

/// Store seeded with one order awaiting confirmation and its connected host.
pub async fn seeded_store(order: &Order, shared_revenue: bool) -> InMemoryLedgerStore {
    let store = InMemoryLedgerStore::new();
    store
        .insert_host_account(host_account(order.collective_id, true, shared_revenue))
        .await;
    store.insert_order(order.clone()).await;
    store
}
