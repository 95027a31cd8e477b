use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("stripe rejected the request parameters: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("stripe unreachable: {message}")]
    NetworkError { message: String },

    #[error("stripe throttled the request: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("bad webhook signature: {message}")]
    WebhookVerificationError { message: String },

    #[error("unreadable webhook payload: {message}")]
    WebhookParseError { message: String },

    #[error("{provider} error ({}): {message}", .provider_code.as_deref().unwrap_or("unknown"))]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    /// Transport failures, throttling and provider 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::NetworkError { .. } | PaymentError::RateLimitError { .. } => true,
            PaymentError::ProviderError { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Stripe's `resource_missing` code: the intent, charge or balance
    /// transaction does not exist on the account that was queried.
    pub fn is_resource_missing(&self) -> bool {
        matches!(
            self,
            PaymentError::ProviderError { provider_code: Some(code), .. } if code == "resource_missing"
        )
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } | PaymentError::WebhookParseError { .. } => 400,
            PaymentError::WebhookVerificationError { .. } => 401,
            PaymentError::RateLimitError { .. } => 429,
            PaymentError::ProviderError { .. } => 502,
            PaymentError::NetworkError { .. } => 503,
        }
    }

    pub fn user_message(&self) -> String {
        let message = match self {
            PaymentError::ValidationError { message, .. } => return message.clone(),
            PaymentError::NetworkError { .. } => "Stripe could not be reached, try again shortly",
            PaymentError::RateLimitError { .. } => "Stripe is throttling requests, try again shortly",
            PaymentError::WebhookVerificationError { .. } => "Webhook signature rejected",
            PaymentError::WebhookParseError { .. } => "Webhook payload is not a Stripe event",
            PaymentError::ProviderError { .. } => "Stripe rejected the request",
        };
        message.to_string()
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError};

        let external = match &err {
            PaymentError::RateLimitError {
                retry_after_seconds,
                ..
            } => ExternalError::RateLimit {
                provider: "stripe".to_string(),
                retry_after: *retry_after_seconds,
            },
            PaymentError::ProviderError { provider, .. } => ExternalError::PaymentProvider {
                provider: provider.clone(),
                is_retryable: err.is_retryable(),
                message: err.to_string(),
            },
            _ => ExternalError::PaymentProvider {
                provider: "stripe".to_string(),
                is_retryable: err.is_retryable(),
                message: err.to_string(),
            },
        };
        AppError::new(AppErrorKind::External(external))
    }
}
