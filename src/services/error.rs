use crate::database::error::DatabaseError;
use crate::error::{
    AppError, AppErrorKind, DomainError, ExternalError, InfrastructureError, ValidationError,
};
use crate::payments::error::PaymentError;
use crate::payments::types::PaymentMethodType;
use crate::services::order_state::{OrderEvent, OrderStatus};
use thiserror::Error;
use uuid::Uuid;

pub type SettlementResult<T> = Result<T, SettlementError>;

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("currency {currency} is not accepted for {payment_method}")]
    UnsupportedCurrency {
        currency: String,
        payment_method: PaymentMethodType,
    },

    #[error("host of collective {collective_id} has no connected provider account")]
    HostNotConnected { collective_id: Uuid },

    #[error("host of collective {collective_id} lost its provider account")]
    HostAccountMissing { collective_id: Uuid },

    #[error("order {order_ref} not found")]
    OrderNotFound { order_ref: String },

    #[error("unrecognized redirect outcome: {0}")]
    UnrecognizedOutcome(String),

    #[error("order in status {from} cannot handle {event}")]
    IllegalTransition { from: OrderStatus, event: OrderEvent },

    #[error("payment intent {received} does not belong to order {order_id}")]
    IntentMismatch { order_id: Uuid, received: String },

    #[error("settlement incomplete: {0}")]
    SettlementIncomplete(String),

    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("payment provider rejected the request: {0}")]
    ProviderRejected(String),

    #[error("ledger write failed: {0}")]
    LedgerWriteFailed(String),

    #[error("ledger read failed: {0}")]
    LedgerReadFailed(String),
}

impl SettlementError {
    pub fn ledger_write(err: DatabaseError) -> Self {
        SettlementError::LedgerWriteFailed(err.to_string())
    }

    pub fn ledger_read(err: DatabaseError) -> Self {
        SettlementError::LedgerReadFailed(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::ProviderUnavailable(_)
                | SettlementError::SettlementIncomplete(_)
                | SettlementError::LedgerWriteFailed(_)
                | SettlementError::LedgerReadFailed(_)
        )
    }
}

impl From<PaymentError> for SettlementError {
    fn from(err: PaymentError) -> Self {
        if err.is_retryable() {
            SettlementError::ProviderUnavailable(err.to_string())
        } else if err.is_resource_missing() {
            SettlementError::ProviderRejected(format!(
                "{} (not visible on the queried account)",
                err
            ))
        } else {
            SettlementError::ProviderRejected(err.to_string())
        }
    }
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        let kind = match err {
            SettlementError::UnsupportedCurrency {
                currency,
                payment_method,
            } => AppErrorKind::Domain(DomainError::UnsupportedCurrency {
                currency,
                payment_method: payment_method.to_string(),
            }),
            SettlementError::HostNotConnected { collective_id } => {
                AppErrorKind::Domain(DomainError::HostNotConnected {
                    collective_id: collective_id.to_string(),
                })
            }
            SettlementError::HostAccountMissing { collective_id } => {
                AppErrorKind::Domain(DomainError::HostAccountMissing {
                    collective_id: collective_id.to_string(),
                })
            }
            SettlementError::OrderNotFound { order_ref } => {
                AppErrorKind::Domain(DomainError::OrderNotFound { order_ref })
            }
            SettlementError::UnrecognizedOutcome(value) => {
                AppErrorKind::Validation(ValidationError::UnrecognizedOutcome { value })
            }
            SettlementError::IllegalTransition { from, event } => {
                AppErrorKind::Domain(DomainError::IllegalTransition {
                    from: from.to_string(),
                    event: event.to_string(),
                })
            }
            SettlementError::IntentMismatch { order_id, received } => {
                AppErrorKind::Validation(ValidationError::IntentMismatch {
                    order_id: order_id.to_string(),
                    received,
                })
            }
            SettlementError::SettlementIncomplete(reason) => {
                AppErrorKind::Domain(DomainError::SettlementIncomplete { reason })
            }
            SettlementError::ProviderUnavailable(message) => {
                AppErrorKind::External(ExternalError::PaymentProvider {
                    provider: "stripe".to_string(),
                    message,
                    is_retryable: true,
                })
            }
            SettlementError::ProviderRejected(message) => {
                AppErrorKind::External(ExternalError::PaymentProvider {
                    provider: "stripe".to_string(),
                    message,
                    is_retryable: false,
                })
            }
            SettlementError::LedgerWriteFailed(message)
            | SettlementError::LedgerReadFailed(message) => {
                AppErrorKind::Infrastructure(InfrastructureError::Database {
                    message,
                    is_retryable: true,
                })
            }
        };

        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_split_on_retryability() {
        let unavailable: SettlementError = PaymentError::NetworkError {
            message: "timeout".to_string(),
        }
        .into();
        assert!(matches!(unavailable, SettlementError::ProviderUnavailable(_)));

        let rejected: SettlementError = PaymentError::ValidationError {
            message: "bad currency".to_string(),
            field: None,
        }
        .into();
        assert!(matches!(rejected, SettlementError::ProviderRejected(_)));
    }

    #[test]
    fn settlement_errors_map_to_http_statuses() {
        let not_found: AppError = SettlementError::OrderNotFound {
            order_ref: "x".to_string(),
        }
        .into();
        assert_eq!(not_found.status_code(), 404);

        let outcome: AppError = SettlementError::UnrecognizedOutcome("maybe".to_string()).into();
        assert_eq!(outcome.status_code(), 400);

        let ledger: AppError = SettlementError::LedgerWriteFailed("down".to_string()).into();
        assert_eq!(ledger.status_code(), 500);
        assert!(ledger.is_retryable());
    }
}
