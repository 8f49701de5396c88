use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;

use crate::core::{CancelFlag, EngineConfig, EngineError, Result};

/// Outcome of a single failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// Worth another try: timeouts, connection resets, 5xx, 429.
    Retryable(String),
    /// Retrying will not help: other 4xx, missing local file.
    Terminal(String),
}

impl AttemptError {
    pub fn reason(&self) -> &str {
        match self {
            AttemptError::Retryable(r) | AttemptError::Terminal(r) => r,
        }
    }

    pub fn from_status(status: StatusCode) -> Self {
        let reason = format!("HTTP request failed with status: {}", status);
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            AttemptError::Terminal(reason)
        } else {
            AttemptError::Retryable(reason)
        }
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => AttemptError::from_status(status),
            None if e.is_builder() => AttemptError::Terminal(e.to_string()),
            None => AttemptError::Retryable(e.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            retries: config.fetch_retries,
            base_delay: config.retry_base_delay,
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`.
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Run `op` until it succeeds, fails terminally or runs out of retries.
///
/// The cancel flag is checked before every attempt and after every sleep.
pub async fn retry_with_backoff<T, F, Fut>(
    url: &str,
    policy: RetryPolicy,
    cancel: &CancelFlag,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let mut attempts = 0;
    loop {
        cancel.check()?;
        attempts += 1;
        log::debug!("Fetching {} (attempt {})", url, attempts);

        let reason = match op().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Terminal(reason)) => {
                return Err(EngineError::FetchFailure {
                    url: url.to_string(),
                    attempts,
                    reason,
                })
            }
            Err(AttemptError::Retryable(reason)) => reason,
        };

        if attempts > policy.retries {
            return Err(EngineError::FetchFailure {
                url: url.to_string(),
                attempts,
                reason,
            });
        }

        let delay = policy.delay(attempts);
        log::warn!(
            "Fetching {} failed ({}), retrying in {:?}",
            url,
            reason,
            delay
        );
        tokio::time::sleep(delay).await;
        cancel.check()?;
    }
}
