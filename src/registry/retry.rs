//! Retry logic for repository requests with error classification.

use anyhow::{Result, anyhow};
use log::{debug, warn};
use reqwest::StatusCode;
use std::thread;
use std::time::Duration;

/// Maximum number of attempts for one repository request.
pub const MAX_RETRIES: usize = 3;

const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Errors that should not be retried.
#[derive(Debug)]
pub enum NonRetryableError {
    /// HTTP 429, or 403 mentioning a rate limit
    RateLimitExceeded(String),
    /// HTTP 401
    AuthenticationFailed(String),
    /// HTTP 404
    NotFound(String),
    /// HTTP 403 without a rate limit message
    Forbidden(String),
    /// Other 4xx responses
    ClientError(String),
}

impl std::fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonRetryableError::RateLimitExceeded(msg) => {
                write!(f, "Rate limit exceeded: {}. Try again later.", msg)
            }
            NonRetryableError::AuthenticationFailed(msg) => {
                write!(
                    f,
                    "Authentication failed: {}. Check the repository credentials in auth.json.",
                    msg
                )
            }
            NonRetryableError::NotFound(msg) => write!(f, "Not found: {}", msg),
            NonRetryableError::Forbidden(msg) => write!(f, "Access forbidden: {}", msg),
            NonRetryableError::ClientError(msg) => write!(f, "Request error: {}", msg),
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Classify a failed request. `Ok(())` means the request may be retried.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        // Connection errors, timeouts and the like
        return Ok(());
    };
    match status {
        StatusCode::UNAUTHORIZED => Err(NonRetryableError::AuthenticationFailed(
            "The repository requires authentication".to_string(),
        )),
        StatusCode::FORBIDDEN => {
            if error.to_string().contains("rate limit") {
                Err(NonRetryableError::RateLimitExceeded(
                    "Repository rate limit exceeded".to_string(),
                ))
            } else {
                Err(NonRetryableError::Forbidden(
                    "Access to this package is forbidden".to_string(),
                ))
            }
        }
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimitExceeded(
            "Too many requests".to_string(),
        )),
        StatusCode::NOT_FOUND => Err(NonRetryableError::NotFound(
            "The requested package was not found".to_string(),
        )),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} error",
            s.as_u16()
        ))),
        _ => Ok(()),
    }
}

/// Convert an `error_for_status()` failure, marking client errors as final.
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}

fn is_retryable_error(e: &anyhow::Error) -> bool {
    if e.downcast_ref::<NonRetryableError>().is_some() {
        return false;
    }
    if let Some(request_error) = e.downcast_ref::<reqwest::Error>() {
        return classify_error(request_error).is_ok();
    }

    let error_str = format!("{:#}", e).to_lowercase();
    error_str.contains("connection")
        || error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("reset")
        || error_str.contains("broken pipe")
        || error_str.contains("dns")
        || error_str.contains("resolve")
}

/// Run `operation`, retrying network and server errors.
/// Client errors fail immediately.
pub fn with_retry<F, T>(operation_name: &str, operation: F) -> Result<T>
where
    F: Fn() -> Result<T>,
{
    with_retry_delay(operation_name, RETRY_DELAY, operation)
}

fn with_retry_delay<F, T>(operation_name: &str, delay: Duration, operation: F) -> Result<T>
where
    F: Fn() -> Result<T>,
{
    let mut last_error = None;

    for attempt in 1..=MAX_RETRIES {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable_error(&e) {
                    debug!("{}: non-retryable error: {:#}", operation_name, e);
                    return Err(e);
                }
                if attempt < MAX_RETRIES {
                    warn!(
                        "{}: attempt {}/{} failed ({:#}), retrying in {}ms...",
                        operation_name,
                        attempt,
                        MAX_RETRIES,
                        e,
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow!("{}: failed after {} attempts", operation_name, MAX_RETRIES)))
}
