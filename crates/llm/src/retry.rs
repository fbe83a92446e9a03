use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use withyou_common::{Result, WithYouError};

use crate::client::{LlmClient, LlmRequest, LlmResponse};

/// Bounded exponential backoff for hosted model calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Delay multiplier applied per retry.
    pub exp_base: f64,
    /// HTTP statuses treated as transient.
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            exp_base: 2.0,
            retryable_status_codes: vec![429, 500, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, error: &WithYouError) -> bool {
        error
            .status()
            .is_some_and(|status| self.retryable_status_codes.contains(&status))
    }

    /// Delay before retry number `retry` (0-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, retry: u32) -> u64 {
        let base = self.initial_delay_ms as f64 * self.exp_base.powi(retry as i32);
        let jitter = (base * 0.1 * jitter_fraction(retry)) as u64;
        (base as u64).saturating_add(jitter).min(self.max_delay_ms)
    }
}

/// Deterministic jitter in [0, 1) derived from the retry number.
fn jitter_fraction(retry: u32) -> f64 {
    let x = retry.wrapping_mul(2654435761);
    (x % 100) as f64 / 100.0
}

pub struct RetryingClient<T: LlmClient> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let attempts = self.policy.attempts.max(1);
        let mut retry = 0;

        loop {
            let error = match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !self.policy.is_retryable(&error) {
                return Err(error);
            }

            if retry + 1 >= attempts {
                return Err(WithYouError::RetriesExhausted {
                    attempts,
                    last_error: error.to_string(),
                });
            }

            let delay = match &error {
                WithYouError::Upstream {
                    retry_after_ms: Some(ms),
                    ..
                } => (*ms).min(self.policy.max_delay_ms),
                _ => self.policy.delay_for(retry),
            };

            warn!(
                attempt = retry + 1,
                attempts = attempts,
                delay_ms = delay,
                model = %self.inner.model_name(),
                error = %error,
                "Retrying model request"
            );

            tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
            retry += 1;
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
