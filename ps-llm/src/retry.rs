//! Bounded exponential backoff around inference calls.
//!
//! The delay before retry `i` (0-based, i.e. after the `i+1`-th failed attempt) is
//! `min(base_delay * multiplier^i, max_delay)`. With `max_attempts = N` at most
//! `N` requests are sent and at most `N - 1` delays are slept.

use crate::client::ChatBackend;
use crate::error::Result;
use crate::types::{ChatMessage, ChatResponse, ToolDefinition};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Every delay this policy can sleep, in order.
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|i| self.delay_for(i))
            .collect()
    }

    fn wait_before_retry(&self, retry_index: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_delay),
            None => self.delay_for(retry_index),
        }
    }
}

/// Wraps a backend so that transient failures are retried per [`RetryPolicy`];
/// fatal failures and exhausted retries are returned to the caller unchanged.
pub struct RetryingBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B> RetryingBackend<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<B: ChatBackend> ChatBackend for RetryingBackend<B> {
    #[tracing::instrument(level = "debug", skip_all)]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match self.inner.chat(messages, tools).await {
                Ok(resp) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "inference call succeeded after retry");
                    }
                    return Ok(resp);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                tracing::error!(attempt, error = %err, "inference call failed with fatal error");
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::error!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "inference retries exhausted"
                );
                return Err(err);
            }

            let delay = self
                .policy
                .wait_before_retry(attempt - 1, err.retry_after());
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient inference failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
