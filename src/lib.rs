//! Ratekeeper Library
//!
//! Client-side admission control for quota-limited HTTP APIs: per-endpoint
//! token buckets, a deferred request queue, rate-limit aware retry with
//! exponential backoff, and a `reqwest` client that applies both.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod retry;

pub use client::ThrottledClient;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{RateKeeperError, RateLimitError};
pub use rate_limit::{EndpointRateLimit, LimiterSettings, Locale, RateLimiter};
pub use retry::{is_rate_limit_error, retry_with_backoff, RetryConfig};
