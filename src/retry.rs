//! Rate-Limit Aware Retry
//!
//! Retries an async operation with exponential backoff, but only when it
//! failed because of a rate limit. Every other error is returned on first
//! occurrence.
//!
//! # Example
//!
//! ```ignore
//! use ratekeeper::retry::{retry_with_backoff, RetryConfig};
//!
//! let config = RetryConfig::default()
//!     .max_retries(3)
//!     .initial_delay(Duration::from_secs(1))
//!     .max_delay(Duration::from_secs(30));
//!
//! let quiz = retry_with_backoff(&config, || async {
//!     generate_quiz().await
//! }).await?;
//! ```

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::RateKeeperError;
use crate::metrics;

/// Retry configuration
///
/// # Fields
///
/// * `max_retries` - Total attempts, including the first (default: 3)
/// * `initial_delay` - Wait after the first rate-limited attempt (default: 1s)
/// * `max_delay` - Upper bound for any single wait (default: 30s)
/// * `factor` - Multiplier applied to the wait after each retry (default: 2.0)
/// * `jitter` - Random variation as a fraction of the wait (default: 0.0)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including initial attempt)
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Growth factor per retry
    pub factor: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            factor: 2.0,
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total number of attempts
    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts;
        self
    }

    /// Set the delay before the first retry
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Set the jitter factor, clamped to `[0.0, 1.0]`
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Wait after the `attempt`-th failure (1-based)
    ///
    /// `min(max_delay, initial_delay * factor^(attempt - 1))`, then jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        let capped = if scaled.is_finite() && scaled < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(scaled.max(0.0))
        } else {
            self.max_delay
        };
        self.apply_jitter(capped)
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }

        let jitter_range = delay.mul_f64(self.jitter).as_secs_f64();
        let offset = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let jittered = (delay.as_secs_f64() + offset).max(0.0);
        Duration::from_secs_f64(jittered).min(self.max_delay)
    }
}

/// Whether an error means "slow down"
///
/// A [`RateKeeperError`] anywhere in the chain decides on its own (local
/// denial or HTTP 429). Otherwise the rendered error is searched for `429`
/// or `rate limit` (any case).
pub fn is_rate_limit_error(error: &anyhow::Error) -> bool {
    if let Some(typed) = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<RateKeeperError>())
    {
        return typed.is_rate_limit();
    }

    let message = format!("{:#}", error).to_lowercase();
    message.contains("429") || message.contains("rate limit")
}

/// Retry an operation while it keeps failing with rate-limit errors
///
/// Makes up to `max_retries - 1` attempts in the retry loop, sleeping
/// between them, then one final attempt whose result is returned as-is.
/// Non-rate-limit errors are returned immediately. `max_retries == 0` is
/// treated as a single attempt.
pub async fn retry_with_backoff<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let looped_attempts = config.max_retries.saturating_sub(1);

    for attempt in 1..=looped_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        "Operation succeeded on attempt {} after {} retries",
                        attempt,
                        attempt - 1
                    );
                }
                return Ok(result);
            }
            Err(e) if is_rate_limit_error(&e) => {
                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    "Attempt {} hit a rate limit: {}, retrying in {:?}",
                    attempt,
                    e,
                    delay
                );
                metrics::RETRIES_TOTAL.inc();
                sleep(delay).await;
            }
            Err(e) => {
                tracing::error!("Attempt {} failed, not retrying: {}", attempt, e);
                return Err(e);
            }
        }
    }

    let result = operation().await;
    if let Err(e) = &result {
        tracing::error!(
            "Final attempt {} failed: {}",
            looped_attempts + 1,
            e
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(1000));
        assert_eq!(config.max_delay, Duration::from_millis(30_000));
        assert_eq!(config.factor, 2.0);
        assert_eq!(config.jitter, 0.0);
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .max_retries(5)
            .initial_delay(Duration::from_millis(50))
            .max_delay(Duration::from_secs(10))
            .factor(3.0)
            .jitter(0.2);

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(50));
        assert_eq!(config.max_delay, Duration::from_secs(10));
        assert_eq!(config.factor, 3.0);
        assert_eq!(config.jitter, 0.2);
    }

    #[test]
    fn test_delay_growth() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_millis(1000))
            .max_delay(Duration::from_millis(30_000))
            .factor(2.0);

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(16_000));
        assert_eq!(config.delay_for_attempt(6), Duration::from_millis(30_000));
        assert_eq!(config.delay_for_attempt(200), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_millis(1000))
            .jitter(0.2);

        for _ in 0..50 {
            let delay = config.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(800) && delay <= Duration::from_millis(1200));
        }
    }

    #[test]
    fn test_jitter_clamping() {
        assert_eq!(RetryConfig::new().jitter(1.5).jitter, 1.0);
        assert_eq!(RetryConfig::new().jitter(-0.5).jitter, 0.0);
    }

    #[test]
    fn test_is_rate_limit_error() {
        assert!(is_rate_limit_error(&anyhow::anyhow!("HTTP 429 Too Many Requests")));
        assert!(is_rate_limit_error(&anyhow::anyhow!("Rate Limit exceeded")));
        assert!(is_rate_limit_error(&anyhow::anyhow!("quota: RATE LIMIT hit")));
        assert!(is_rate_limit_error(&anyhow::Error::new(
            RateKeeperError::UpstreamStatus {
                status: 429,
                message: "slow down".to_string(),
            }
        )));
        assert!(is_rate_limit_error(
            &anyhow::Error::new(RateKeeperError::RateLimited {
                endpoint: "gemini".to_string(),
                retry_after_secs: 2,
            })
            .context("Quiz generation failed")
        ));

        assert!(!is_rate_limit_error(&anyhow::anyhow!("Connection refused")));
        assert!(!is_rate_limit_error(&anyhow::Error::new(
            RateKeeperError::UpstreamStatus {
                status: 500,
                message: "boom".to_string(),
            }
        )));
    }

    #[test]
    fn test_typed_error_is_authoritative() {
        let err = anyhow::Error::new(RateKeeperError::UpstreamStatus {
            status: 500,
            message: "worker 429 crashed".to_string(),
        });
        assert!(!is_rate_limit_error(&err));
    }

    #[test]
    fn test_context_wrapped_message_is_inspected() {
        let err = anyhow::anyhow!("server said 429").context("Sync failed");
        assert!(is_rate_limit_error(&err));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_rate_limits() {
        let config = RetryConfig::default();
        let attempts = Arc::new(AtomicUsize::new(0));
        let gaps = Arc::new(Mutex::new(Vec::new()));
        let last = Arc::new(Mutex::new(tokio::time::Instant::now()));

        let result: Result<&str> = retry_with_backoff(&config, || {
            let attempts = Arc::clone(&attempts);
            let gaps = Arc::clone(&gaps);
            let last = Arc::clone(&last);
            async move {
                let now = tokio::time::Instant::now();
                let previous = std::mem::replace(&mut *last.lock().unwrap(), now);
                gaps.lock().unwrap().push(now - previous);

                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow::anyhow!("HTTP 429"))
                } else {
                    Ok("quiz")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "quiz");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        let gaps = gaps.lock().unwrap();
        assert_eq!(gaps[1], Duration::from_millis(1000));
        assert_eq!(gaps[2], Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_fast_on_other_errors() {
        let config = RetryConfig::default().max_retries(5);
        let attempts = Arc::new(AtomicUsize::new(0));
        let start = tokio::time::Instant::now();

        let result: Result<i32> = retry_with_backoff(&config, || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("Unauthorized"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().to_string(), "Unauthorized");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_bounded_by_max_retries() {
        let config = RetryConfig::default()
            .max_retries(4)
            .initial_delay(Duration::from_millis(10));
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<i32> = retry_with_backoff(&config, || {
            let attempts = Arc::clone(&attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("rate limit exceeded"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_attempt_error_is_returned_untouched() {
        let config = RetryConfig::default().max_retries(2);
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<i32> = retry_with_backoff(&config, || {
            let attempts = Arc::clone(&attempts);
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(anyhow::anyhow!("429"))
                } else {
                    Err(anyhow::anyhow!("Invalid JSON"))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap_err().to_string(), "Invalid JSON");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_and_one_retries_mean_single_attempt() {
        for max_retries in [0, 1] {
            let config = RetryConfig::default().max_retries(max_retries);
            let attempts = Arc::new(AtomicUsize::new(0));

            let result: Result<i32> = retry_with_backoff(&config, || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("429"))
                }
            })
            .await;

            assert!(result.is_err());
            assert_eq!(attempts.load(Ordering::SeqCst), 1);
        }
    }
}
