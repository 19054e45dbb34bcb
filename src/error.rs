//! Ratekeeper Error Types
//!
//! Errors raised by the limiter configuration surface and by throttled
//! upstream calls. Compositional code wraps these in `anyhow::Error`;
//! [`crate::retry::is_rate_limit_error`] downcasts back to them.

/// Errors from configuring or addressing the rate limiter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Endpoint keys must be non-empty
    #[error("Endpoint key must not be empty")]
    EmptyEndpoint,

    /// A non-positive requests-per-minute or burst size
    #[error("Invalid rate limit for endpoint '{endpoint}': {reason}")]
    InvalidLimit { endpoint: String, reason: String },
}

/// Errors surfaced to callers of throttled upstream operations
#[derive(Debug, thiserror::Error)]
pub enum RateKeeperError {
    /// The local limiter refused admission, even after waiting
    #[error("Rate limit exceeded for endpoint '{endpoint}', retry after {retry_after_secs}s")]
    RateLimited {
        endpoint: String,
        retry_after_secs: u64,
    },

    /// The upstream answered with a non-success HTTP status
    #[error("Upstream returned HTTP {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    /// Limiter configuration was rejected
    #[error(transparent)]
    Config(#[from] RateLimitError),
}

impl RateKeeperError {
    /// Whether this error is a rate-limit signal (local denial or HTTP 429)
    pub fn is_rate_limit(&self) -> bool {
        match self {
            RateKeeperError::RateLimited { .. } => true,
            RateKeeperError::UpstreamStatus { status, .. } => *status == 429,
            RateKeeperError::Config(_) => false,
        }
    }
}
