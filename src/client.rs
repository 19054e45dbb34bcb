//! Throttled HTTP Client
//!
//! Wraps `reqwest` so that every attempt first takes a token from the
//! endpoint's bucket and rate-limited attempts are retried with backoff.
//! Non-success statuses become [`RateKeeperError::UpstreamStatus`], which
//! lets the retry loop tell HTTP 429 apart from real failures.
//!
//! Transport errors carry no URL text: the URL lives on the request span,
//! so a "429" inside a path or port never reads as a rate limit.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, Instrument};

use crate::error::RateKeeperError;
use crate::rate_limit::RateLimiter;
use crate::retry::{retry_with_backoff, RetryConfig};

/// Longest upstream error body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

/// HTTP client gated by a shared [`RateLimiter`]
#[derive(Debug, Clone)]
pub struct ThrottledClient {
    http: reqwest::Client,
    limiter: RateLimiter,
    retry: RetryConfig,
}

impl ThrottledClient {
    /// Create a client with a default `reqwest::Client`
    pub fn new(limiter: RateLimiter, retry: RetryConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), limiter, retry)
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_http_client(http: reqwest::Client, limiter: RateLimiter, retry: RetryConfig) -> Self {
        Self {
            http,
            limiter,
            retry,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// GET `url` and decode the JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, url: &str) -> Result<T> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("throttled_get", %request_id, endpoint, url);

        retry_with_backoff(&self.retry, move || async move {
            self.admit(endpoint).await?;
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(reqwest::Error::without_url)
                .context("GET request failed")?;
            decode_response(response).await
        })
        .instrument(span)
        .await
    }

    /// POST `body` as JSON to `url` and decode the JSON response
    pub async fn post_json<B, T>(&self, endpoint: &str, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("throttled_post", %request_id, endpoint, url);

        retry_with_backoff(&self.retry, move || async move {
            self.admit(endpoint).await?;
            let response = self
                .http
                .post(url)
                .json(body)
                .send()
                .await
                .map_err(reqwest::Error::without_url)
                .context("POST request failed")?;
            decode_response(response).await
        })
        .instrument(span)
        .await
    }

    /// Take a token or fail with a retryable [`RateKeeperError::RateLimited`]
    async fn admit(&self, endpoint: &str) -> Result<()> {
        if self.limiter.acquire(endpoint).await {
            return Ok(());
        }

        let retry_after_secs = self.limiter.estimated_wait_secs(endpoint).await;
        Err(RateKeeperError::RateLimited {
            endpoint: endpoint.to_string(),
            retry_after_secs,
        }
        .into())
    }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    debug!(status = status.as_u16(), "Upstream responded");

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("unknown status").to_string()
        } else {
            body.chars().take(MAX_ERROR_BODY_CHARS).collect()
        };
        return Err(RateKeeperError::UpstreamStatus {
            status: status.as_u16(),
            message,
        }
        .into());
    }

    response
        .json::<T>()
        .await
        .map_err(reqwest::Error::without_url)
        .context("Failed to decode upstream JSON response")
}
