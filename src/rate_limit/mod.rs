//! Rate Limiting Module
//!
//! Per-endpoint token-bucket admission control for outbound calls to
//! quota-limited APIs.
//!
//! # Features
//!
//! - Token bucket with lazy, time-proportional refill
//! - Independent limits per endpoint key, default limit for unknown keys
//! - Non-blocking (`try_acquire`) and single-wait (`acquire`) admission
//! - Deferred request queue with priority-ordered draining
//! - Wait estimates and localized, screen-reader friendly status messages
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RateLimiter                           │
//! │   configure · try_acquire · acquire · queue · reset · stats  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │         EndpointStore (behind one mutex)             │    │
//! │  │   endpoint → { limit, TokenBucket, counters }        │    │
//! │  │   endpoint → RequestQueue                            │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     Clock (injected)                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bucket;
pub mod config;
pub mod limiter;
pub mod locale;
pub mod queue;
pub mod stats;
pub mod store;

#[cfg(test)]
mod proptests;

pub use bucket::TokenBucket;
pub use config::{EndpointRateLimit, LimiterSettings, DEFAULT_ENDPOINT};
pub use limiter::{QueueRunSummary, RateLimiter};
pub use locale::Locale;
pub use queue::QueuedRequest;
pub use stats::{EndpointStats, LimiterReport};
