// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry engine with exponential backoff + jitter for converter calls.
//
// Only transport failures (server unreachable, connection reset, 5xx) are
// retried. A converter that answered with an error will answer the same way
// again, and timeouts are final because the per-call budget is already spent.

use std::future::Future;
use std::time::Duration;

use mailarchiv_core::{ConvertError, PipelineConfig};
use tracing::{debug, warn};

/// How often and how patiently a converter call is repeated.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first call; `0` calls exactly once.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further one.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            ..Self::default()
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// What to do after a failed call.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then call again.
    RetryAfter(Duration),
    /// The error is permanent.
    GiveUp,
    /// Transient, but out of retries.
    Exhausted,
}

/// Decide whether to retry based on the error and attempt count.
pub fn should_retry(err: &ConvertError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    if !err.is_transient() {
        return RetryDecision::GiveUp;
    }
    if attempt < config.max_retries {
        let delay = backoff(attempt, config);
        debug!(attempt, delay_ms = delay.as_millis(), %err, "retrying converter call");
        return RetryDecision::RetryAfter(delay);
    }
    warn!(attempts = attempt + 1, %err, "converter still unreachable, giving up");
    RetryDecision::Exhausted
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
/// The last error is returned unchanged.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut call: F) -> Result<T, ConvertError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConvertError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => match should_retry(&err, attempt, config) {
                RetryDecision::RetryAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp | RetryDecision::Exhausted => return Err(err),
            },
        }
    }
}

/// `base * 2^attempt` plus jitter, capped at `max_delay`.
fn backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let doubled = config.base_delay.saturating_mul(1 << attempt.min(10));
    let spread = Duration::from_millis(jitter(config.base_delay, attempt));
    doubled.saturating_add(spread).min(config.max_delay)
}

/// Deterministic spread below `base`, derived from the attempt number.
fn jitter(base: Duration, attempt: u32) -> u64 {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX).max(1);
    u64::from(attempt).wrapping_mul(6364136223846793005) % base_ms
}
