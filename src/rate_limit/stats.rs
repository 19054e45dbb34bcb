//! Endpoint Statistics
//!
//! Serializable snapshots of limiter state for the CLI and for callers
//! that surface "please wait" information.

use serde::{Deserialize, Serialize};

use super::store::EndpointState;

/// Point-in-time view of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    /// Endpoint key
    pub endpoint: String,

    /// Sustained requests per minute
    pub requests_per_minute: u32,

    /// Bucket capacity
    pub burst_size: u32,

    /// Whether the limit came from an explicit `configure`
    pub configured: bool,

    /// Tokens available after refilling
    pub available_tokens: f64,

    /// Admissions granted
    pub granted: u64,

    /// Admissions denied
    pub denied: u64,

    /// Requests waiting in the endpoint queue
    pub queued: usize,

    /// Seconds until the next admission
    pub estimated_wait_secs: u64,
}

impl EndpointStats {
    /// Snapshot an endpoint; `state` should be freshly refilled
    pub fn from_state(endpoint: &str, state: &EndpointState, queued: usize) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            requests_per_minute: state.limit.requests_per_minute,
            burst_size: state.limit.burst_size,
            configured: state.configured,
            available_tokens: state.bucket.tokens(),
            granted: state.granted,
            denied: state.denied,
            queued,
            estimated_wait_secs: state.bucket.estimated_wait_secs(),
        }
    }

    /// Share of admission attempts that were granted, in percent
    pub fn grant_rate_percent(&self) -> f64 {
        let total = self.granted + self.denied;
        if total > 0 {
            (self.granted as f64 / total as f64) * 100.0
        } else {
            100.0
        }
    }
}

/// Snapshot of every known endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterReport {
    /// Timestamp of report generation
    pub generated_at: chrono::DateTime<chrono::Utc>,

    /// Per-endpoint statistics, sorted by key
    pub endpoints: Vec<EndpointStats>,
}

impl LimiterReport {
    pub fn new(endpoints: Vec<EndpointStats>) -> Self {
        Self {
            generated_at: chrono::Utc::now(),
            endpoints,
        }
    }

    pub fn total_granted(&self) -> u64 {
        self.endpoints.iter().map(|s| s.granted).sum()
    }

    pub fn total_denied(&self) -> u64 {
        self.endpoints.iter().map(|s| s.denied).sum()
    }

    /// Endpoints with no token available right now
    pub fn throttled_endpoints(&self) -> Vec<&EndpointStats> {
        self.endpoints
            .iter()
            .filter(|s| s.estimated_wait_secs > 0)
            .collect()
    }
}
