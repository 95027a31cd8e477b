//! HTTP plumbing and signing helpers shared by provider clients.

use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::{header::RETRY_AFTER, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest pause between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// One outgoing provider call. Cloned headers and form fields are re-sent on
/// every attempt, so an idempotency key stays stable across retries.
#[derive(Debug, Clone)]
pub struct ProviderRequest<'a> {
    method: Method,
    url: String,
    bearer: Option<&'a str>,
    headers: Vec<(&'static str, &'a str)>,
    form: Option<&'a [(String, String)]>,
}

impl<'a> ProviderRequest<'a> {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            headers: Vec::new(),
            form: None,
        }
    }

    pub fn bearer(mut self, token: &'a str) -> Self {
        self.bearer = Some(token);
        self
    }

    pub fn headers(mut self, headers: Vec<(&'static str, &'a str)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn form(mut self, fields: &'a [(String, String)]) -> Self {
        self.form = Some(fields);
        self
    }
}

/// What to do after a single attempt.
enum Attempt<T> {
    Done(T),
    Retry {
        error: PaymentError,
        wait: Option<Duration>,
    },
    Fail(PaymentError),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    provider: String,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(provider: &str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::NetworkError {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            provider: provider.to_string(),
            max_retries,
        })
    }

    /// Sends `request` and decodes a JSON body. Throttling, 5xx and transport
    /// failures are retried up to `max_retries` times.
    pub async fn send<T: DeserializeOwned>(&self, request: &ProviderRequest<'_>) -> PaymentResult<T> {
        let mut attempt = 0;
        loop {
            let (error, wait) = match self.attempt(request).await {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry { error, wait } => (error, wait),
            };

            if attempt >= self.max_retries {
                return Err(error);
            }
            let pause = wait.unwrap_or_else(|| backoff(attempt)).min(MAX_BACKOFF);
            warn!(
                provider = %self.provider,
                url = %request.url,
                attempt = attempt + 1,
                pause_ms = pause.as_millis() as u64,
                error = %error,
                "provider call failed, retrying"
            );
            tokio::time::sleep(pause).await;
            attempt += 1;
        }
    }

    async fn attempt<T: DeserializeOwned>(&self, request: &ProviderRequest<'_>) -> Attempt<T> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url);
        if let Some(token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(*name, *value);
        }
        if let Some(fields) = request.form {
            builder = builder.form(fields);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Retry {
                    error: PaymentError::NetworkError {
                        message: format!("provider request failed: {}", e),
                    },
                    wait: None,
                }
            }
        };

        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return Attempt::Retry {
                    error: PaymentError::NetworkError {
                        message: format!("failed to read provider response: {}", e),
                    },
                    wait: None,
                }
            }
        };
        debug!(provider = %self.provider, %status, url = %request.url, "provider responded");

        if status.is_success() {
            return match serde_json::from_str::<T>(&text) {
                Ok(value) => Attempt::Done(value),
                Err(e) => Attempt::Fail(PaymentError::ProviderError {
                    provider: self.provider.clone(),
                    message: format!("invalid provider JSON response: {}", e),
                    provider_code: None,
                    retryable: false,
                }),
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retry {
                error: PaymentError::RateLimitError {
                    message: "provider rate limit exceeded".to_string(),
                    retry_after_seconds: retry_after.map(|d| d.as_secs()),
                },
                wait: retry_after,
            };
        }

        let error = self.error_from_body(status, &text);
        if status.is_server_error() {
            Attempt::Retry { error, wait: None }
        } else {
            Attempt::Fail(error)
        }
    }

    fn error_from_body(&self, status: StatusCode, text: &str) -> PaymentError {
        let body = serde_json::from_str::<ErrorEnvelope>(text)
            .ok()
            .map(|envelope| envelope.error);
        let message = body
            .as_ref()
            .and_then(|b| b.message.clone())
            .unwrap_or_else(|| format!("HTTP {}: {}", status, text));

        if status == StatusCode::BAD_REQUEST {
            return PaymentError::ValidationError {
                message,
                field: None,
            };
        }

        let provider_code = body
            .and_then(|b| b.code.or(b.kind))
            .unwrap_or_else(|| status.as_u16().to_string());
        PaymentError::ProviderError {
            provider: self.provider.clone(),
            message,
            provider_code: Some(provider_code),
            retryable: status.is_server_error(),
        }
    }
}

/// 1s, 2s, 4s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1_u64 << attempt.min(6))
}

/// `Retry-After` in its delta-seconds form; HTTP dates are ignored.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub fn hmac_sha256_hex(payload: &[u8], secret: &str) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison for signatures.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
