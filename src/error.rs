//! Unified error handling for the settlement service
//!
//! Layer-specific errors (`PaymentError`, `DatabaseError`, `SettlementError`)
//! convert into [`AppError`], which carries the HTTP status mapping, a stable
//! error code and a user-facing message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    OrderNotFound,
    UnsupportedCurrency,
    HostNotConnected,
    HostAccountMissing,
    IllegalTransition,
    SettlementIncomplete,
    UnrecognizedOutcome,
    IntentMismatch,
    DatabaseError,
    ConfigurationError,
    PaymentProviderError,
    RateLimitError,
    InternalError,
}

/// Settlement rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Order reference is unknown or malformed
    OrderNotFound { order_ref: String },
    UnsupportedCurrency {
        currency: String,
        payment_method: String,
    },
    /// Collective's host never connected a provider account
    HostNotConnected { collective_id: String },
    /// Collective's host no longer has its provider account
    HostAccountMissing { collective_id: String },
    IllegalTransition { from: String, event: String },
    /// Provider settlement data is not yet available
    SettlementIncomplete { reason: String },
}

#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    RateLimit {
        provider: String,
        retry_after: Option<u64>,
    },
}

/// Malformed callback input
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Redirect outcome outside {succeeded, failed}
    UnrecognizedOutcome { value: String },
    /// Callback intent does not match the order's stored intent
    IntentMismatch { order_id: String, received: String },
}

/// Error surfaced by handlers, tagged with request id and context.
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// HTTP status and stable code, in one table.
    fn classify(&self) -> (u16, ErrorCode) {
        use AppErrorKind::*;
        match &self.kind {
            Domain(DomainError::OrderNotFound { .. }) => (404, ErrorCode::OrderNotFound),
            Domain(DomainError::UnsupportedCurrency { .. }) => {
                (422, ErrorCode::UnsupportedCurrency)
            }
            Domain(DomainError::HostNotConnected { .. }) => (422, ErrorCode::HostNotConnected),
            Domain(DomainError::HostAccountMissing { .. }) => (422, ErrorCode::HostAccountMissing),
            Domain(DomainError::IllegalTransition { .. }) => (409, ErrorCode::IllegalTransition),
            // 503 so webhook senders redeliver once the provider has settled.
            Domain(DomainError::SettlementIncomplete { .. }) => {
                (503, ErrorCode::SettlementIncomplete)
            }
            Validation(ValidationError::UnrecognizedOutcome { .. }) => {
                (400, ErrorCode::UnrecognizedOutcome)
            }
            Validation(ValidationError::IntentMismatch { .. }) => (400, ErrorCode::IntentMismatch),
            Infrastructure(InfrastructureError::Database { .. }) => (500, ErrorCode::DatabaseError),
            Infrastructure(InfrastructureError::Configuration { .. }) => {
                (500, ErrorCode::ConfigurationError)
            }
            External(ExternalError::PaymentProvider { .. }) => {
                (502, ErrorCode::PaymentProviderError)
            }
            External(ExternalError::RateLimit { .. }) => (429, ErrorCode::RateLimitError),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.classify().0
    }

    pub fn error_code(&self) -> ErrorCode {
        self.classify().1
    }

    /// Message safe to show a payer; also used as the error-page reason.
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { order_ref } => {
                    format!("Order '{}' not found", order_ref)
                }
                DomainError::UnsupportedCurrency {
                    currency,
                    payment_method,
                } => format!(
                    "Currency {} is not supported by {}",
                    currency.to_uppercase(),
                    payment_method
                ),
                DomainError::HostNotConnected { .. } => {
                    "This collective's host has not connected a payment account".to_string()
                }
                DomainError::HostAccountMissing { .. } => {
                    "This collective's host no longer has a payment account".to_string()
                }
                DomainError::IllegalTransition { from, event } => {
                    format!("Order in status {} cannot handle {}", from, event)
                }
                DomainError::SettlementIncomplete { .. } => {
                    "Your payment is still being settled, check back in a moment".to_string()
                }
            },
            AppErrorKind::Validation(ValidationError::UnrecognizedOutcome { value }) => {
                format!("Unrecognized payment outcome '{}'", value)
            }
            AppErrorKind::Validation(ValidationError::IntentMismatch { .. }) => {
                "Payment does not belong to this order".to_string()
            }
            AppErrorKind::Infrastructure(_) => {
                "Payments are temporarily unavailable, please try again later".to_string()
            }
            AppErrorKind::External(ExternalError::PaymentProvider {
                provider,
                is_retryable: true,
                ..
            }) => format!("{} is temporarily unavailable, please try again", provider),
            AppErrorKind::External(ExternalError::PaymentProvider { .. }) => {
                "Your payment could not be processed, please contact support".to_string()
            }
            AppErrorKind::External(ExternalError::RateLimit {
                provider,
                retry_after,
            }) => match retry_after {
                Some(secs) => format!("{} is busy, retry in {} seconds", provider, secs),
                None => format!("{} is busy, please retry shortly", provider),
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(err) => matches!(err, DomainError::SettlementIncomplete { .. }),
            AppErrorKind::Infrastructure(InfrastructureError::Database { is_retryable, .. })
            | AppErrorKind::External(ExternalError::PaymentProvider { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::Infrastructure(InfrastructureError::Configuration { .. }) => false,
            AppErrorKind::External(ExternalError::RateLimit { .. }) => true,
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.user_message(), context),
            None => f.write_str(&self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError>, From<PaymentError> and From<SettlementError> live next
// to their error types.

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_not_found_is_404() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
            order_ref: "abc".to_string(),
        }));

        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::OrderNotFound);
        assert!(error.user_message().contains("abc"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn unsupported_currency_names_the_currency() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::UnsupportedCurrency {
            currency: "brl".to_string(),
            payment_method: "alipay".to_string(),
        }));

        assert_eq!(error.status_code(), 422);
        assert!(error.user_message().contains("BRL"));
    }

    #[test]
    fn incomplete_settlement_asks_for_redelivery() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::SettlementIncomplete {
            reason: "intent processing".to_string(),
        }));

        assert_eq!(error.status_code(), 503);
        assert!(error.is_retryable());
    }

    #[test]
    fn rate_limit_is_retryable() {
        let error = AppError::new(AppErrorKind::External(ExternalError::RateLimit {
            provider: "stripe".to_string(),
            retry_after: Some(60),
        }));

        assert_eq!(error.status_code(), 429);
        assert_eq!(error.error_code(), ErrorCode::RateLimitError);
        assert!(error.user_message().contains("60 seconds"));
        assert!(error.is_retryable());
    }

    #[test]
    fn unrecognized_outcome_has_its_own_code() {
        let error = AppError::new(AppErrorKind::Validation(
            ValidationError::UnrecognizedOutcome {
                value: "pending".to_string(),
            },
        ))
        .with_context("confirm callback");

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::UnrecognizedOutcome);
        assert!(error.to_string().ends_with("(confirm callback)"));
    }

    #[test]
    fn codes_serialize_screaming_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorCode::PaymentProviderError).unwrap(),
            "PAYMENT_PROVIDER_ERROR"
        );
    }
}
