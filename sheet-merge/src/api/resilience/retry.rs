//! Bounded retry driven by response status
//!
//! The policy retries while the store answers with a status from
//! [`RetryConfig::retry_statuses`], sleeping a fixed delay between attempts.
//! Transport errors are returned as-is on the attempt that produced them.

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use reqwest::StatusCode;

/// Retry behaviour for uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
    /// Statuses meaning the document is locked or was changed concurrently
    pub retry_statuses: Vec<StatusCode>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
            retry_statuses: vec![
                StatusCode::CONFLICT,
                StatusCode::LOCKED,
                StatusCode::SERVICE_UNAVAILABLE,
            ],
        }
    }
}

impl RetryConfig {
    /// A single attempt
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// Anything carrying an HTTP status the policy can inspect
pub trait HttpStatus {
    fn status(&self) -> StatusCode;
}

impl HttpStatus for reqwest::Response {
    fn status(&self) -> StatusCode {
        reqwest::Response::status(self)
    }
}

impl HttpStatus for StatusCode {
    fn status(&self) -> StatusCode {
        *self
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// The store answered with a status that is not retried (success or otherwise)
    Completed { response: T, attempts: u32 },
    /// Every attempt answered with a retryable status
    Exhausted { last: T, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Completed { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op` until it returns a non-retryable status or attempts run out.
    /// `op` receives the 1-based attempt number.
    pub async fn execute<T, E, F, Fut>(&self, mut op: F) -> Result<RetryOutcome<T>, E>
    where
        T: HttpStatus,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let response = op(attempt).await?;
            let status = response.status();

            if !self.config.is_retryable(status) {
                debug!("Attempt {attempt}/{max_attempts} finished with {status}");
                return Ok(RetryOutcome::Completed {
                    response,
                    attempts: attempt,
                });
            }
            if attempt >= max_attempts {
                warn!("Attempt {attempt}/{max_attempts} returned {status}; giving up");
                return Ok(RetryOutcome::Exhausted {
                    last: response,
                    attempts: attempt,
                });
            }

            warn!(
                "Attempt {attempt}/{max_attempts} returned {status}; retrying in {:?}",
                self.config.delay
            );
            tokio::time::sleep(self.config.delay).await;
            attempt += 1;
        }
    }
}
