//! Retry utilities for forecast requests with exponential backoff.
//!
//! Each attempt is raced against a per-attempt timeout. By default the
//! executor retries transient failures:
//! - Connectivity faults (`network`)
//! - Timeouts
//! - 5xx server errors
//!
//! It does NOT retry 4xx client errors or unclassifiable failures.
//!
//! The error returned after the final attempt is always a [`ClassifiedError`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use skycast_core::RetryConfig;

use crate::error::{classify, ClassifiedError, Failure};

/// Default retry configuration
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 300;
pub const DEFAULT_MAX_DELAY_MS: u64 = 2000;
pub const DEFAULT_TIMEOUT_MS: u64 = 8000;

/// Decides whether a classified failure on attempt `n` (0-based) is retried.
pub type RetryPredicate = Arc<dyn Fn(&ClassifiedError, u32) -> bool + Send + Sync>;

/// Retry configuration
#[derive(Clone)]
pub struct RetryOptions {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Perturb delays by roughly -10%..+10%
    pub jitter: bool,
    /// Upper bound for a single attempt
    pub timeout: Duration,
    pub should_retry: RetryPredicate,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: true,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            should_retry: Arc::new(default_should_retry),
        }
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl From<&RetryConfig> for RetryOptions {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
            timeout: Duration::from_millis(config.timeout_ms),
            ..Self::default()
        }
    }
}

/// Retry iff the failure is `network`, `timeout` or `http_5xx`.
pub fn default_should_retry(error: &ClassifiedError, _attempt: u32) -> bool {
    error.kind.is_transient()
}

impl RetryOptions {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ClassifiedError, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Un-jittered delay after attempt `attempt`: `min(max_delay, base_delay * 2^attempt)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }

    /// Delay actually waited after attempt `attempt`, with jitter applied when enabled.
    ///
    /// Approximately bounded by `max_delay`: jitter may exceed it by up to 10%.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.delay_for_attempt(attempt);
        if !self.jitter {
            return exp;
        }
        let sample: f64 = rand::rng().random_range(0.0..=1.0);
        jittered(exp, sample)
    }

    /// Worst case of [`backoff`](Self::backoff) for `attempt`.
    pub fn max_backoff(&self, attempt: u32) -> Duration {
        let exp = self.delay_for_attempt(attempt);
        if self.jitter {
            jittered(exp, 1.0)
        } else {
            exp
        }
    }
}

/// `exp - 0.1 * exp + sample * 0.2 * exp` for `sample` in `[0, 1]`.
fn jittered(exp: Duration, sample: f64) -> Duration {
    let exp_ns = exp.as_nanos() as f64;
    let delay_ns = exp_ns - exp_ns * 0.1 + sample.clamp(0.0, 1.0) * exp_ns * 0.2;
    Duration::from_nanos(delay_ns.max(0.0).round() as u64)
}

/// Execute an operation with per-attempt timeout and retry logic.
///
/// # Arguments
/// * `options` - Retry configuration
/// * `operation` - Closure producing a fresh future per attempt
///
/// # Returns
/// The first successful value, or the classified failure of the last attempt
///
/// # Example
/// ```ignore
/// let body = with_retry(&RetryOptions::default(), || async {
///     client.get(url).send().await?.error_for_status()?.text().await
/// })
/// .await?;
/// ```
pub async fn with_retry<T, E, F, Fut>(
    options: &RetryOptions,
    mut operation: F,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<Failure>,
{
    let mut attempt = 0u32;

    loop {
        // A timed-out attempt's future is dropped here, so a late result is discarded.
        let outcome = match tokio::time::timeout(options.timeout, operation()).await {
            Ok(Ok(value)) => {
                if attempt > 0 {
                    tracing::info!("Request succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Ok(Err(e)) => classify(e),
            Err(_) => ClassifiedError::timeout(options.timeout.as_millis()),
        };

        if attempt >= options.max_retries {
            tracing::error!(
                "All {} attempts exhausted: {}",
                options.max_retries + 1,
                outcome
            );
            return Err(outcome);
        }

        if !(options.should_retry)(&outcome, attempt) {
            tracing::debug!("Non-retryable error: {}", outcome);
            return Err(outcome);
        }

        let delay = options.backoff(attempt);
        tracing::warn!(
            "Retryable error on attempt {} of {}: {}; waiting {:?}",
            attempt + 1,
            options.max_retries + 1,
            outcome,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
