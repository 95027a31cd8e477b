//! Settlement and reconciliation services

pub mod confirmation;
pub mod currency_conversion;
pub mod error;
pub mod fee_calculation;
pub mod order_state;
pub mod payment_orchestrator;
pub mod refund_reconciler;
pub mod webhook_processor;

pub use confirmation::{ConfirmationHandler, ConfirmationOutcome};
pub use error::{SettlementError, SettlementResult};
pub use payment_orchestrator::{IntentOutcome, PaymentIntentOrchestrator, PaymentPolicy};
pub use refund_reconciler::{RefundOutcome, RefundReconciler};
pub use webhook_processor::{WebhookOutcome, WebhookProcessor, WebhookProcessorError};
