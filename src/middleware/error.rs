//! JSON rendering of `AppError` for API callers.
//!
//! The redirect callback never renders these; it turns errors into a browser
//! redirect instead.

use crate::error::{AppError, ErrorCode};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Webhook senders and API clients may safely repeat the request.
    pub retryable: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            retryable: error.is_retryable(),
            timestamp: Utc::now().to_rfc3339(),
            context: error.context.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse::from(&self);

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?body.error,
                request_id = ?self.request_id,
                status = status.as_u16(),
                "request failed"
            );
        } else {
            tracing::info!(
                error = %self,
                code = ?body.error,
                request_id = ?self.request_id,
                status = status.as_u16(),
                "request rejected"
            );
        }

        (status, Json(body)).into_response()
    }
}

/// Tags the error with the request id set by `SetRequestIdLayer`, if any.
pub fn with_request_id(error: AppError, headers: &HeaderMap) -> AppError {
    match headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(request_id) => error.with_request_id(request_id),
        None => error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppErrorKind, DomainError, ValidationError};

    #[test]
    fn body_carries_code_and_request_id() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::OrderNotFound {
            order_ref: "ord_404".to_string(),
        }))
        .with_request_id("req_123");

        let body = ErrorResponse::from(&error);

        assert_eq!(body.error, ErrorCode::OrderNotFound);
        assert_eq!(body.request_id.as_deref(), Some("req_123"));
        assert!(body.message.contains("ord_404"));
        assert!(!body.retryable);
    }

    #[test]
    fn unrecognized_outcome_is_a_bad_request() {
        let error = AppError::new(AppErrorKind::Validation(
            ValidationError::UnrecognizedOutcome {
                value: "maybe".to_string(),
            },
        ));

        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn request_id_is_copied_from_headers() {
        let error = || {
            AppError::new(AppErrorKind::Domain(DomainError::SettlementIncomplete {
                reason: "no charge".to_string(),
            }))
        };

        let mut headers = HeaderMap::new();
        assert_eq!(with_request_id(error(), &headers).request_id, None);

        headers.insert(REQUEST_ID_HEADER, "abc".parse().unwrap());
        assert_eq!(
            with_request_id(error(), &headers).request_id.as_deref(),
            Some("abc")
        );
    }
}
