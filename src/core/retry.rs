//! Retry logic with linear, exponential or scheduled backoff and optional jitter.
//!
//! Used by the persistence adapter for save retries and exposed to callers
//! through the recovery layer for retrying their own operations.

use std::future::Future;
use std::time::{Duration, Instant};

/// How the delay grows between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// `step * attempt`.
    Linear { step: Duration },
    /// `initial * multiplier^(attempt - 1)`.
    Exponential { initial: Duration, multiplier: f64 },
    /// Explicit per-attempt delays; the last entry repeats.
    Schedule(Vec<Duration>),
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,

    /// Delay growth between attempts.
    pub backoff: Backoff,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Whether to add jitter to delays (prevents thundering herd).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::Exponential { initial: Duration::from_millis(100), multiplier: 2.0 },
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Linearly increasing delay without jitter (persistence writes).
    pub fn linear(max_retries: u32, step: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Linear { step },
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }

    /// Create a config for AI/API operations (longer delays).
    pub fn api() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::Exponential { initial: Duration::from_secs(1), multiplier: 2.0 },
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }

    /// Calculate delay before the given retry (1-based; 0 means the first attempt).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = match &self.backoff {
            Backoff::Linear { step } => step.as_millis() as f64 * f64::from(attempt),
            Backoff::Exponential { initial, multiplier } => {
                initial.as_millis() as f64 * multiplier.powi(attempt as i32 - 1)
            }
            Backoff::Schedule(delays) => {
                let index = (attempt as usize - 1).min(delays.len().saturating_sub(1));
                delays.get(index).map_or(0.0, |d| d.as_millis() as f64)
            }
        };
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // Add up to 25% jitter
            let jitter_factor = 1.0 + (rand_jitter() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Simple pseudo-random jitter (0.0 to 1.0) without external deps.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1000) / 1000.0
}

/// Result of a retry operation.
#[derive(Debug)]
pub struct RetryResult<T, E> {
    /// The final result (success or last error).
    pub result: Result<T, E>,

    /// Number of attempts made.
    pub attempts: u32,

    /// Total time spent (including delays).
    pub total_time: Duration,
}

impl<T, E> RetryResult<T, E> {
    /// Whether more than one attempt was made.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Get the result.
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Retry an async operation with the given configuration.
pub async fn retry_async<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let mut attempts = 0;
    let max_attempts = config.max_retries + 1;

    loop {
        attempts += 1;
        let result = operation().await;

        match result {
            Err(ref e) if attempts < max_attempts => {
                let delay = config.delay_for_attempt(attempts);
                tracing::warn!(attempt = attempts, delay_ms = delay.as_millis() as u64, error = %e, "Operation failed, retrying");
                tokio::time::sleep(delay).await;
            }
            _ => return RetryResult { result, attempts, total_time: start.elapsed() },
        }
    }
}

/// Retry an async operation, returning the last failure once retries run out.
pub async fn retry_with_backoff<T, E, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_async(config, operation).await.into_result()
}
