//! Retry policy for backend calls.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is retried
//! - Compute the wait before the next attempt
//!
//! # Design Decisions
//! - Only transport failures (timeout, connect, I/O) are retried
//! - A backend response of any status is final, including 5xx
//! - Retries apply regardless of method; the request body is buffered

use std::time::Duration;

use crate::config::schema::RetryConfig;
use crate::error::TransportError;
use crate::resilience::backoff::calculate_backoff;

/// Backoff bounds plus the per-route retry limit.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Whether attempt `attempt` (0-based) failing with `error` gets another try.
    pub fn should_retry(&self, attempt: u32, error: &TransportError) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }

    /// Wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        calculate_backoff(retry, self.base_delay_ms, self.max_delay_ms)
    }
}
