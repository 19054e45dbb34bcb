//! Rate Limit Configuration
//!
//! Per-endpoint limits and limiter-wide settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RateLimitError;

/// Default rate limits
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;
pub const DEFAULT_BURST_SIZE: u32 = 10;

/// Longest a single `acquire` call may wait for a token
pub const DEFAULT_MAX_WAIT_MS: u64 = 60_000;

/// Endpoint key used when the caller has no more specific domain
pub const DEFAULT_ENDPOINT: &str = "default";

/// Immutable rate limit for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRateLimit {
    /// Sustained requests per minute
    pub requests_per_minute: u32,

    /// Burst size (bucket capacity)
    pub burst_size: u32,
}

impl Default for EndpointRateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            burst_size: DEFAULT_BURST_SIZE,
        }
    }
}

impl EndpointRateLimit {
    /// Build a validated limit
    ///
    /// `burst_size` defaults to `requests_per_minute / 6`, never less than 1.
    pub fn new(requests_per_minute: u32, burst_size: Option<u32>) -> Result<Self, RateLimitError> {
        Self::for_endpoint(DEFAULT_ENDPOINT, requests_per_minute, burst_size)
    }

    /// Same as [`EndpointRateLimit::new`], naming `endpoint` in errors
    pub fn for_endpoint(
        endpoint: &str,
        requests_per_minute: u32,
        burst_size: Option<u32>,
    ) -> Result<Self, RateLimitError> {
        if requests_per_minute == 0 {
            return Err(RateLimitError::InvalidLimit {
                endpoint: endpoint.to_string(),
                reason: "requests_per_minute must be > 0".to_string(),
            });
        }

        let burst_size = match burst_size {
            Some(0) => {
                return Err(RateLimitError::InvalidLimit {
                    endpoint: endpoint.to_string(),
                    reason: "burst_size must be > 0".to_string(),
                })
            }
            Some(burst) => burst,
            None => default_burst_for(requests_per_minute),
        };

        Ok(Self {
            requests_per_minute,
            burst_size,
        })
    }

    /// Tokens added per second
    pub fn refill_rate_per_sec(&self) -> f64 {
        self.requests_per_minute as f64 / 60.0
    }
}

/// One-sixth of a minute's worth of requests, at least one
pub fn default_burst_for(requests_per_minute: u32) -> u32 {
    (requests_per_minute / 6).max(1)
}

/// Limiter-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterSettings {
    /// Limit applied to endpoints that were never configured
    pub default_limit: EndpointRateLimit,

    /// Cap on the single wait inside `acquire`
    pub max_wait: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            default_limit: EndpointRateLimit::default(),
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
        }
    }
}

impl LimiterSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limit used for unconfigured endpoints
    pub fn default_limit(mut self, limit: EndpointRateLimit) -> Self {
        self.default_limit = limit;
        self
    }

    /// Set the `acquire` wait cap
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}
