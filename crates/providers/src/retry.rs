//! Provider retry — bounded attempts with per-attempt timeouts and backoff.
//!
//! Wraps a single provider. Transient failures (network, timeout, rate limit,
//! 5xx) are retried with exponential backoff; everything else returns at
//! once. The worst-case wall time is bounded by
//! `(max_retries + 1) * timeout + sum(backoffs)`.

use async_trait::async_trait;
use madoguchi_core::error::ProviderError;
use madoguchi_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// A provider that retries transient failures of an inner provider.
pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl RetryProvider {
    /// Wrap `inner` with a 30s per-attempt timeout, 2 retries, 500ms initial backoff.
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            inner,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }

    /// Set the deadline for each attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries after the first attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial backoff; it doubles after each failed attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay before retry number `retry` (0-based), honoring rate-limit hints.
    fn delay_for(&self, retry: u32, error: &ProviderError) -> Duration {
        let exponential = self
            .backoff
            .saturating_mul(2u32.saturating_pow(retry))
            .min(MAX_BACKOFF);
        match error {
            ProviderError::RateLimited { retry_after_secs } => {
                exponential.max(Duration::from_secs(*retry_after_secs).min(MAX_BACKOFF))
            }
            _ => exponential,
        }
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let attempts = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match tokio::time::timeout(self.timeout, self.inner.complete(request.clone()))
                .await
            {
                Ok(Ok(response)) => {
                    if attempt > 1 {
                        info!(provider = %self.inner.name(), attempt, "Retry: provider recovered");
                    }
                    return Ok(response);
                }
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}s",
                    self.inner.name(),
                    self.timeout.as_secs_f32()
                )),
            };

            if !error.is_transient() || attempt >= attempts {
                warn!(
                    provider = %self.inner.name(),
                    attempt,
                    total = attempts,
                    error = %error,
                    "Retry: giving up"
                );
                return Err(error);
            }

            let delay = self.delay_for(attempt - 1, &error);
            warn!(
                provider = %self.inner.name(),
                attempt,
                total = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retry: transient failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
