mod common;

use common::{awaiting_order, balance, seeded_store, succeeded_intent, ScriptedProvider};
use redirect_settlement::database::memory::InMemoryLedgerStore;
use redirect_settlement::payments::providers::{StripeConfig, StripeProvider};
use redirect_settlement::payments::types::PaymentMethodType;
use redirect_settlement::payments::utils::hmac_sha256_hex;
use redirect_settlement::services::confirmation::ConfirmationHandler;
use redirect_settlement::services::refund_reconciler::{
    RefundIgnoreReason, RefundOutcome, RefundReconciler,
};
use redirect_settlement::services::webhook_processor::{
    WebhookOutcome, WebhookProcessor, WebhookProcessorError,
};
use serde_json::json;
use std::sync::Arc;

const SECRET: &str = "whsec_test_secret";

fn stripe() -> Arc<StripeProvider> {
    Arc::new(
        StripeProvider::new(StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: Some(SECRET.to_string()),
            ..StripeConfig::default()
        })
        .unwrap(),
    )
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

fn refund_event(charge: &str, status: &str) -> Vec<u8> {
    json!({
        "id": "evt_refund_1",
        "object": "event",
        "type": "charge.refund.updated",
        "account": common::HOST_ACCOUNT,
        "created": chrono::Utc::now().timestamp(),
        "data": {
            "object": {
                "id": "re_1",
                "object": "refund",
                "amount": 1000,
                "currency": "usd",
                "status": status,
                "charge": charge,
                "balance_transaction": "txn_re_1"
            }
        }
    })
    .to_string()
    .into_bytes()
}

async fn setup() -> (WebhookProcessor, InMemoryLedgerStore) {
    let scripted = Arc::new(ScriptedProvider::new());
    let order = awaiting_order("usd", 1000, "pi_1");
    let store = seeded_store(&order, false).await;
    scripted.insert_intent(succeeded_intent("pi_1", "ch_1", "txn_1", 1000, "usd"));
    scripted.insert_balance(balance("txn_1", 1000, "usd", 59, 50));
    scripted.insert_balance(balance("txn_re_1", -1000, "usd", 0, 0));

    ConfirmationHandler::new(scripted.clone(), Arc::new(store.clone()))
        .confirm(&order.id.to_string(), "pi_1", "succeeded")
        .await
        .unwrap();

    let reconcilers = [PaymentMethodType::Alipay, PaymentMethodType::Card]
        .into_iter()
        .map(|method| {
            Arc::new(RefundReconciler::new(
                scripted.clone(),
                Arc::new(store.clone()),
                method,
            ))
        })
        .collect();

    (WebhookProcessor::new(stripe(), reconcilers), store)
}

#[tokio::test]
async fn signed_refund_event_is_dispatched_to_every_reconciler() {
    let (processor, store) = setup().await;
    let payload = refund_event("ch_1", "succeeded");
    let signature = sign(&payload, SECRET, chrono::Utc::now().timestamp());

    let outcome = processor
        .process_webhook(Some(&signature), &payload)
        .await
        .unwrap();

    let WebhookOutcome::Refund { results } = outcome else {
        panic!("expected refund outcome");
    };
    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], RefundOutcome::Reversed { .. }));
    assert_eq!(
        results[1],
        RefundOutcome::Ignored {
            reason: RefundIgnoreReason::ForeignPaymentMethod
        }
    );
    assert_eq!(store.transactions().await.len(), 2);
}

#[tokio::test]
async fn same_event_delivered_twice_posts_one_reversal() {
    let (processor, store) = setup().await;
    let payload = refund_event("ch_1", "succeeded");
    let signature = sign(&payload, SECRET, chrono::Utc::now().timestamp());

    processor
        .process_webhook(Some(&signature), &payload)
        .await
        .unwrap();
    processor
        .process_webhook(Some(&signature), &payload)
        .await
        .unwrap();

    let reversals = store
        .transactions()
        .await
        .into_iter()
        .filter(|t| t.is_refund)
        .count();
    assert_eq!(reversals, 1);
}

#[tokio::test]
async fn refund_for_unknown_charge_is_acknowledged() {
    let (processor, store) = setup().await;
    let payload = refund_event("ch_nobody", "succeeded");
    let signature = sign(&payload, SECRET, chrono::Utc::now().timestamp());

    let outcome = processor
        .process_webhook(Some(&signature), &payload)
        .await
        .unwrap();

    let WebhookOutcome::Refund { results } = outcome else {
        panic!("expected refund outcome");
    };
    assert!(results.iter().all(|r| *r
        == RefundOutcome::Ignored {
            reason: RefundIgnoreReason::TransactionNotFound
        }));
    assert_eq!(store.transactions().await.len(), 1);
}

#[tokio::test]
async fn wrong_secret_is_rejected_without_writes() {
    let (processor, store) = setup().await;
    let payload = refund_event("ch_1", "succeeded");
    let signature = sign(&payload, "whsec_attacker", chrono::Utc::now().timestamp());

    let result = processor.process_webhook(Some(&signature), &payload).await;

    assert!(matches!(result, Err(WebhookProcessorError::InvalidSignature)));
    assert_eq!(store.transactions().await.len(), 1);
}

#[tokio::test]
async fn stale_timestamp_is_rejected() {
    let (processor, _) = setup().await;
    let payload = refund_event("ch_1", "succeeded");
    let signature = sign(&payload, SECRET, chrono::Utc::now().timestamp() - 3600);

    let result = processor.process_webhook(Some(&signature), &payload).await;
    assert!(matches!(result, Err(WebhookProcessorError::InvalidSignature)));
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let (processor, _) = setup().await;
    let payload = refund_event("ch_1", "succeeded");

    let result = processor.process_webhook(None, &payload).await;
    assert!(matches!(result, Err(WebhookProcessorError::InvalidSignature)));
}

#[tokio::test]
async fn tampered_payload_is_rejected() {
    let (processor, _) = setup().await;
    let payload = refund_event("ch_1", "succeeded");
    let signature = sign(&payload, SECRET, chrono::Utc::now().timestamp());
    let tampered = refund_event("ch_2", "succeeded");

    let result = processor.process_webhook(Some(&signature), &tampered).await;
    assert!(matches!(result, Err(WebhookProcessorError::InvalidSignature)));
}

#[tokio::test]
async fn unrelated_event_types_are_ignored() {
    let (processor, store) = setup().await;
    let payload = json!({
        "id": "evt_2",
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_9" } }
    })
    .to_string()
    .into_bytes();
    let signature = sign(&payload, SECRET, chrono::Utc::now().timestamp());

    let outcome = processor
        .process_webhook(Some(&signature), &payload)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        WebhookOutcome::Ignored {
            event_type: "payment_intent.created".to_string()
        }
    );
    assert_eq!(store.transactions().await.len(), 1);
}

#[tokio::test]
async fn signed_garbage_is_malformed() {
    let (processor, _) = setup().await;
    let payload = b"not json".to_vec();
    let signature = sign(&payload, SECRET, chrono::Utc::now().timestamp());

    let result = processor.process_webhook(Some(&signature), &payload).await;
    assert!(matches!(result, Err(WebhookProcessorError::Malformed(_))));
}
