//! Rate Limiter
//!
//! Per-endpoint token-bucket admission control. One instance is built at
//! startup and shared (it is cheap to clone; clones share state).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::config::{EndpointRateLimit, LimiterSettings};
use super::locale::Locale;
use super::queue::QueuedRequest;
use super::stats::{EndpointStats, LimiterReport};
use super::store::EndpointStore;
use crate::clock::{Clock, MonotonicClock};
use crate::error::RateLimitError;
use crate::metrics;

/// Outcome of [`RateLimiter::process_queue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRunSummary {
    /// Requests that were admitted and run
    pub executed: usize,

    /// Requests still waiting
    pub remaining: usize,
}

/// Token-bucket rate limiter keyed by endpoint
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Default limit and wait cap
    settings: Arc<LimiterSettings>,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Endpoint registries; every bucket mutation happens under this lock
    store: Arc<Mutex<EndpointStore>>,
}

/// Result of one admission attempt that may claim work from the store
enum Claim<T> {
    /// A token was taken and `T` claimed in the same critical section
    Granted(T),
    /// Still no token after the single wait
    Denied,
    /// Nothing left to admit for; no token was taken
    Idle,
}

impl RateLimiter {
    /// Create a limiter on the real monotonic clock
    pub fn new(settings: LimiterSettings) -> Self {
        Self::with_clock(settings, Arc::new(MonotonicClock::new()))
    }

    /// Create a limiter on a caller-supplied clock
    pub fn with_clock(settings: LimiterSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings: Arc::new(settings),
            clock,
            store: Arc::new(Mutex::new(EndpointStore::new())),
        }
    }

    /// Create with default settings (60 requests/minute, burst 10)
    pub fn default_settings() -> Self {
        Self::new(LimiterSettings::default())
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    /// Replace the endpoint's limit and start it with a full bucket
    ///
    /// `burst_size` defaults to `requests_per_minute / 6` (at least 1).
    pub async fn configure(
        &self,
        endpoint: &str,
        requests_per_minute: u32,
        burst_size: Option<u32>,
    ) -> Result<(), RateLimitError> {
        if endpoint.is_empty() {
            return Err(RateLimitError::EmptyEndpoint);
        }
        let limit = EndpointRateLimit::for_endpoint(endpoint, requests_per_minute, burst_size)?;
        self.configure_limit(endpoint, limit).await
    }

    /// Same as [`RateLimiter::configure`] with a prebuilt limit
    pub async fn configure_limit(
        &self,
        endpoint: &str,
        limit: EndpointRateLimit,
    ) -> Result<(), RateLimitError> {
        if endpoint.is_empty() {
            return Err(RateLimitError::EmptyEndpoint);
        }

        let mut store = self.store.lock().await;
        store.set(endpoint, limit, self.clock.now_ms());
        info!(
            endpoint,
            requests_per_minute = limit.requests_per_minute,
            burst_size = limit.burst_size,
            "Configured endpoint rate limit"
        );
        Ok(())
    }

    /// Take a token if one is available, without waiting
    pub async fn try_acquire(&self, endpoint: &str) -> bool {
        let (admitted, configured) = {
            let mut store = self.store.lock().await;
            let now = self.clock.now_ms();
            let state = store.get_or_create(endpoint, self.settings.default_limit, now);
            (state.try_admit(now), state.configured)
        };

        metrics::record_admission(metrics::endpoint_label(endpoint, configured), admitted);
        if !admitted {
            debug!(endpoint, "Admission denied");
        }
        admitted
    }

    /// Take a token, waiting once for the bucket to refill if needed
    ///
    /// The wait is capped at [`LimiterSettings::max_wait`] and no lock is
    /// held across it, so every call returns within that bound regardless
    /// of other callers. If the bucket is still short after the single
    /// wait, returns `false`. Dropping the returned future while it waits
    /// consumes nothing.
    pub async fn acquire(&self, endpoint: &str) -> bool {
        let claim = self.acquire_with(endpoint, |_| true, |_| ()).await;
        matches!(claim, Claim::Granted(()))
    }

    /// Shared body of [`RateLimiter::acquire`] and [`RateLimiter::process_queue`]
    ///
    /// `pending` is checked under the store lock before any token is taken;
    /// `claim` runs under the same lock right after a token is taken.
    async fn acquire_with<T>(
        &self,
        endpoint: &str,
        pending: impl Fn(&EndpointStore) -> bool,
        mut claim: impl FnMut(&mut EndpointStore) -> T,
    ) -> Claim<T> {
        let (wait, label) = {
            let mut store = self.store.lock().await;
            if !pending(&*store) {
                return Claim::Idle;
            }

            let now = self.clock.now_ms();
            let state = store.get_or_create(endpoint, self.settings.default_limit, now);
            let label = metrics::endpoint_label(endpoint, state.configured).to_string();
            state.bucket.refill(now);

            if state.bucket.tokens() >= 1.0 && state.try_admit(now) {
                let value = claim(&mut *store);
                drop(store);
                metrics::record_admission(&label, true);
                return Claim::Granted(value);
            }

            let wait = Duration::from_millis(state.bucket.wait_millis_for_one())
                .min(self.settings.max_wait);
            (wait, label)
        };

        debug!(endpoint, wait_ms = wait.as_millis() as u64, "Waiting for token refill");
        metrics::ACQUIRE_WAIT_SECONDS
            .with_label_values(&[label.as_str()])
            .observe(wait.as_secs_f64());
        tokio::time::sleep(wait).await;

        let mut store = self.store.lock().await;
        if !pending(&*store) {
            return Claim::Idle;
        }

        let now = self.clock.now_ms();
        let admitted = store
            .get_or_create(endpoint, self.settings.default_limit, now)
            .try_admit(now);
        let value = if admitted { Some(claim(&mut *store)) } else { None };
        drop(store);

        metrics::record_admission(&label, admitted);
        match value {
            Some(value) => Claim::Granted(value),
            None => {
                warn!(endpoint, "Bucket still empty after waiting {:?}", wait);
                Claim::Denied
            }
        }
    }

    /// Park work against an endpoint; nothing runs until [`RateLimiter::process_queue`]
    pub async fn queue_request<F, Fut>(
        &self,
        endpoint: &str,
        request_id: impl Into<String>,
        priority: i32,
        action: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let request = QueuedRequest::new(request_id, priority, action);
        let mut store = self.store.lock().await;
        let len = store.enqueue(endpoint, request);
        debug!(endpoint, queue_len = len, "Queued request");
    }

    /// Run queued requests in priority order, one `acquire` each
    ///
    /// A request leaves the queue in the same critical section that takes
    /// its token, so a concurrent drain never wastes a token. Stops at the
    /// first request that is not admitted and leaves it (and everything
    /// behind it) queued. Cancelling this future while an action runs drops
    /// that action; entries still queued are untouched.
    pub async fn process_queue(&self, endpoint: &str) -> QueueRunSummary {
        let mut executed = 0;

        loop {
            let claim = self
                .acquire_with(
                    endpoint,
                    |store| store.queue_len(endpoint) > 0,
                    |store| store.dequeue(endpoint),
                )
                .await;

            let request = match claim {
                Claim::Granted(Some(request)) => request,
                Claim::Granted(None) | Claim::Denied | Claim::Idle => break,
            };

            debug!(endpoint, request_id = %request.request_id, "Running queued request");
            request.run().await;
            executed += 1;
        }

        if executed > 0 {
            let label = self.metric_label(endpoint).await;
            metrics::QUEUE_EXECUTED_TOTAL
                .with_label_values(&[label.as_str()])
                .inc_by(executed as f64);
        }

        QueueRunSummary {
            executed,
            remaining: self.queue_size(endpoint).await,
        }
    }

    /// Remove and return the endpoint's queued requests without running them
    pub async fn take_queued(&self, endpoint: &str) -> Vec<QueuedRequest> {
        self.store.lock().await.take_queue(endpoint)
    }

    /// Seconds until the endpoint can admit a request
    ///
    /// `0` if the endpoint has no bucket yet or a token is available.
    pub async fn estimated_wait_secs(&self, endpoint: &str) -> u64 {
        let mut store = self.store.lock().await;
        let now = self.clock.now_ms();
        match store.get_mut(endpoint) {
            Some(state) => {
                state.bucket.refill(now);
                state.bucket.estimated_wait_secs()
            }
            None => 0,
        }
    }

    /// Localized "ready" or "please wait N seconds" message
    pub async fn accessible_status_message(&self, endpoint: &str, locale: Locale) -> String {
        let wait_secs = self.estimated_wait_secs(endpoint).await;
        locale.status_message(wait_secs)
    }

    /// Forget the endpoint's limit, bucket and queue
    ///
    /// The next use recreates it under the default limit.
    pub async fn reset(&self, endpoint: &str) {
        let discarded = self.store.lock().await.remove(endpoint);
        info!(endpoint, discarded_requests = discarded, "Reset endpoint");
    }

    /// Number of queued requests for the endpoint
    pub async fn queue_size(&self, endpoint: &str) -> usize {
        self.store.lock().await.queue_len(endpoint)
    }

    /// Limit that applies to the endpoint right now
    pub async fn limit_for(&self, endpoint: &str) -> EndpointRateLimit {
        self.store
            .lock()
            .await
            .get(endpoint)
            .map_or(self.settings.default_limit, |state| state.limit)
    }

    async fn metric_label(&self, endpoint: &str) -> String {
        let configured = self
            .store
            .lock()
            .await
            .get(endpoint)
            .is_some_and(|state| state.configured);
        metrics::endpoint_label(endpoint, configured).to_string()
    }

    /// Statistics for one endpoint, if it has a bucket
    pub async fn endpoint_stats(&self, endpoint: &str) -> Option<EndpointStats> {
        let mut store = self.store.lock().await;
        let now = self.clock.now_ms();
        let queued = store.queue_len(endpoint);
        let state = store.get_mut(endpoint)?;
        state.bucket.refill(now);
        Some(EndpointStats::from_state(endpoint, state, queued))
    }

    /// Statistics for every endpoint with a bucket
    pub async fn all_stats(&self) -> LimiterReport {
        let mut store = self.store.lock().await;
        let now = self.clock.now_ms();

        let mut endpoints = Vec::new();
        for key in store.endpoint_keys() {
            let queued = store.queue_len(&key);
            if let Some(state) = store.get_mut(&key) {
                state.bucket.refill(now);
                endpoints.push(EndpointStats::from_state(&key, state, queued));
            }
        }

        LimiterReport::new(endpoints)
    }
}
