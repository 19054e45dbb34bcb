//! Token Bucket
//!
//! Lazily refilled token bucket: no background timer, every read or
//! consumption refills from the elapsed time first. Timestamps come from a
//! [`crate::clock::Clock`] and are passed in as plain milliseconds so the
//! arithmetic stays pure.

/// Admission budget for one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    /// Maximum tokens the bucket can hold (burst size)
    capacity: u32,

    /// Tokens added per second of elapsed time
    refill_rate_per_sec: f64,

    /// Currently available tokens, always within `[0, capacity]`
    tokens: f64,

    /// Clock reading of the last refill
    last_refill_ms: u64,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn full(capacity: u32, refill_rate_per_sec: f64, now_ms: u64) -> Self {
        Self {
            capacity,
            refill_rate_per_sec,
            tokens: capacity as f64,
            last_refill_ms: now_ms,
        }
    }

    /// Add tokens for the time elapsed since the last refill
    ///
    /// A reading earlier than the last refill counts as zero elapsed time.
    pub fn refill(&mut self, now_ms: u64) {
        let elapsed_secs = now_ms.saturating_sub(self.last_refill_ms) as f64 / 1000.0;
        let refilled = self.tokens + elapsed_secs * self.refill_rate_per_sec;
        self.tokens = refilled.min(self.capacity as f64);
        self.last_refill_ms = self.last_refill_ms.max(now_ms);
    }

    /// Refill, then take one token if available
    pub fn try_consume(&mut self, now_ms: u64) -> bool {
        self.refill(now_ms);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Milliseconds until one whole token is available (uncapped)
    ///
    /// Based on the current token count; call [`TokenBucket::refill`] first.
    pub fn wait_millis_for_one(&self) -> u64 {
        if self.tokens >= 1.0 {
            return 0;
        }
        if self.refill_rate_per_sec <= 0.0 {
            return u64::MAX;
        }

        let mut millis = ((1.0 - self.tokens) / self.refill_rate_per_sec * 1000.0).ceil();
        if millis >= u64::MAX as f64 {
            return u64::MAX;
        }
        // Same arithmetic as `refill`, so waiting exactly this long yields a token
        if self.tokens + millis / 1000.0 * self.refill_rate_per_sec < 1.0 {
            millis += 1.0;
        }
        millis as u64
    }

    /// Whole seconds to wait for one token: `floor(deficit / rate) + 1`
    pub fn estimated_wait_secs(&self) -> u64 {
        if self.tokens >= 1.0 {
            return 0;
        }
        if self.refill_rate_per_sec <= 0.0 {
            return u64::MAX;
        }

        let secs = ((1.0 - self.tokens) / self.refill_rate_per_sec).floor() + 1.0;
        if self.tokens + secs * self.refill_rate_per_sec < 1.0 {
            return secs as u64 + 1;
        }
        secs as u64
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate_per_sec(&self) -> f64 {
        self.refill_rate_per_sec
    }

    /// Tokens as of the last refill
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill_ms(&self) -> u64 {
        self.last_refill_ms
    }

    /// Overwrite the token count, clamped to `[0, capacity]`
    #[cfg(test)]
    pub(crate) fn set_tokens(&mut self, tokens: f64) {
        self.tokens = tokens.clamp(0.0, self.capacity as f64);
    }
}
