//! Endpoint Store
//!
//! Per-endpoint registries: limit + bucket + counters, and the deferred
//! request queues. Absence of an entry means "default limit, full bucket".
//! The store itself is not synchronized; [`super::RateLimiter`] guards it
//! with a single mutex.

use std::collections::HashMap;

use super::bucket::TokenBucket;
use super::config::EndpointRateLimit;
use super::queue::{QueuedRequest, RequestQueue};

/// Runtime state of one endpoint
#[derive(Debug, Clone)]
pub struct EndpointState {
    /// Limit the bucket was built from
    pub limit: EndpointRateLimit,

    /// Admission budget
    pub bucket: TokenBucket,

    /// Whether the limit came from an explicit `configure`
    pub configured: bool,

    /// Admissions granted since creation
    pub granted: u64,

    /// Admissions denied since creation
    pub denied: u64,
}

impl EndpointState {
    /// Fresh state with a full bucket
    pub fn new(limit: EndpointRateLimit, configured: bool, now_ms: u64) -> Self {
        Self {
            limit,
            bucket: TokenBucket::full(limit.burst_size, limit.refill_rate_per_sec(), now_ms),
            configured,
            granted: 0,
            denied: 0,
        }
    }

    /// Take one token, updating the counters
    pub fn try_admit(&mut self, now_ms: u64) -> bool {
        let admitted = self.bucket.try_consume(now_ms);
        if admitted {
            self.granted += 1;
        } else {
            self.denied += 1;
        }
        admitted
    }
}

/// In-memory endpoint registries
#[derive(Debug, Default)]
pub struct EndpointStore {
    endpoints: HashMap<String, EndpointState>,
    queues: HashMap<String, RequestQueue>,
}

impl EndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the endpoint's state, creating it under `default_limit`
    pub fn get_or_create(
        &mut self,
        endpoint: &str,
        default_limit: EndpointRateLimit,
        now_ms: u64,
    ) -> &mut EndpointState {
        if !self.endpoints.contains_key(endpoint) {
            tracing::debug!(endpoint, "Creating endpoint with default limit");
        }
        self.endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| EndpointState::new(default_limit, false, now_ms))
    }

    pub fn get(&self, endpoint: &str) -> Option<&EndpointState> {
        self.endpoints.get(endpoint)
    }

    pub fn get_mut(&mut self, endpoint: &str) -> Option<&mut EndpointState> {
        self.endpoints.get_mut(endpoint)
    }

    /// Replace the endpoint's limit and bucket
    pub fn set(&mut self, endpoint: &str, limit: EndpointRateLimit, now_ms: u64) {
        self.endpoints
            .insert(endpoint.to_string(), EndpointState::new(limit, true, now_ms));
    }

    /// Forget everything about the endpoint. Returns the number of queued
    /// requests that were discarded.
    pub fn remove(&mut self, endpoint: &str) -> usize {
        self.endpoints.remove(endpoint);
        self.queues.remove(endpoint).map_or(0, |queue| queue.len())
    }

    /// Queue a request, creating the endpoint's queue on first use
    pub fn enqueue(&mut self, endpoint: &str, request: QueuedRequest) -> usize {
        let queue = self.queues.entry(endpoint.to_string()).or_default();
        queue.push(request);
        queue.len()
    }

    /// Pop the next request to run
    pub fn dequeue(&mut self, endpoint: &str) -> Option<QueuedRequest> {
        self.queues.get_mut(endpoint).and_then(|queue| queue.pop())
    }

    /// Remove the endpoint's whole queue, in execution order
    pub fn take_queue(&mut self, endpoint: &str) -> Vec<QueuedRequest> {
        self.queues
            .remove(endpoint)
            .map(|mut queue| queue.drain())
            .unwrap_or_default()
    }

    pub fn queue_len(&self, endpoint: &str) -> usize {
        self.queues.get(endpoint).map_or(0, |queue| queue.len())
    }

    /// Keys of every endpoint with a bucket or a queue, sorted
    pub fn endpoint_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .endpoints
            .keys()
            .chain(self.queues.keys())
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}
