//! Retry with exponential backoff for remote calls
//!
//! Connection errors, timeouts, `429 Too Many Requests` and `5xx` responses
//! are retried. Anything else is handed back to the caller on the first try.

use crate::utils::config::RetryConfig;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based): `initial * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Whether a response with this status is worth another attempt.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    /// Only failures that happened before the server saw the request, or timeouts.
    fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_connect() || err.is_timeout()
    }

    /// Send the request produced by `build`, retrying transient failures.
    ///
    /// `build` is called once per attempt because a `RequestBuilder` is consumed
    /// by `send`. After the last attempt the final response (or error) is
    /// returned as-is so the caller can report the provider's message.
    pub async fn send<F>(&self, label: &str, build: F) -> Result<Response, reqwest::Error>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let last_attempt = attempt + 1 >= self.max_attempts;
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if last_attempt || !Self::is_retryable_status(status) {
                        return Ok(response);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} returned {} (attempt {}/{}), retrying in {}ms",
                        label,
                        status,
                        attempt + 1,
                        self.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if last_attempt || !Self::is_retryable_error(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed: {} (attempt {}/{}), retrying in {}ms",
                        label,
                        err,
                        attempt + 1,
                        self.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }
}
