//! Property-Based Tests for the Token Bucket
//!
//! Invariants checked against random schedules of refills and
//! consumptions:
//!
//! - Tokens stay within `[0, capacity]`
//! - Refill without consumption is monotonic and exactly proportional
//! - A full bucket admits exactly `capacity` back-to-back requests
//! - The estimated wait is always long enough
//! - Backoff delays grow geometrically up to the cap
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib rate_limit::proptests
//! ```

use proptest::prelude::*;

use super::bucket::TokenBucket;
use super::config::EndpointRateLimit;
use crate::retry::RetryConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Step {
    Advance(u64),
    Consume,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u64..5_000).prop_map(Step::Advance),
        Just(Step::Consume),
    ]
}

fn arb_limit() -> impl Strategy<Value = EndpointRateLimit> {
    (1u32..600, 1u32..50).prop_map(|(rpm, burst)| EndpointRateLimit {
        requests_per_minute: rpm,
        burst_size: burst,
    })
}

proptest! {
    #[test]
    fn prop_tokens_stay_bounded(
        limit in arb_limit(),
        steps in prop::collection::vec(arb_step(), 0..200),
    ) {
        let mut now = 0u64;
        let mut bucket = TokenBucket::full(limit.burst_size, limit.refill_rate_per_sec(), now);

        for step in steps {
            match step {
                Step::Advance(ms) => {
                    now += ms;
                    bucket.refill(now);
                }
                Step::Consume => {
                    bucket.try_consume(now);
                }
            }
            prop_assert!(bucket.tokens() >= 0.0);
            prop_assert!(bucket.tokens() <= limit.burst_size as f64);
        }
    }

    #[test]
    fn prop_refill_is_monotonic_and_exact(
        limit in arb_limit(),
        drained in 0u32..50,
        t1 in 0u64..10_000,
        gap in 0u64..10_000,
    ) {
        let mut bucket = TokenBucket::full(limit.burst_size, limit.refill_rate_per_sec(), 0);
        for _ in 0..drained {
            bucket.try_consume(0);
        }

        bucket.refill(t1);
        let before = bucket.tokens();
        bucket.refill(t1 + gap);
        let after = bucket.tokens();

        prop_assert!(after >= before);
        let expected = (before + gap as f64 / 1000.0 * limit.refill_rate_per_sec())
            .min(limit.burst_size as f64);
        prop_assert!((after - expected).abs() < 1e-9);
    }

    #[test]
    fn prop_full_bucket_admits_exactly_capacity(limit in arb_limit()) {
        let mut bucket = TokenBucket::full(limit.burst_size, limit.refill_rate_per_sec(), 0);

        for _ in 0..limit.burst_size {
            prop_assert!(bucket.try_consume(0));
        }
        prop_assert!(!bucket.try_consume(0));
    }

    #[test]
    fn prop_estimated_wait_is_sufficient(
        limit in arb_limit(),
        elapsed_ms in 0u64..2_000,
    ) {
        let mut bucket = TokenBucket::full(limit.burst_size, limit.refill_rate_per_sec(), 0);
        while bucket.try_consume(0) {}
        bucket.refill(elapsed_ms);

        let wait_secs = bucket.estimated_wait_secs();
        bucket.refill(elapsed_ms + wait_secs * 1000);
        prop_assert!(bucket.tokens() >= 1.0);
    }

    #[test]
    fn prop_wait_millis_is_sufficient(limit in arb_limit()) {
        let mut bucket = TokenBucket::full(limit.burst_size, limit.refill_rate_per_sec(), 0);
        while bucket.try_consume(0) {}

        let wait_ms = bucket.wait_millis_for_one();
        prop_assert!(wait_ms > 0);
        bucket.refill(wait_ms);
        prop_assert!(bucket.try_consume(wait_ms));
    }

    #[test]
    fn prop_backoff_delay_growth(
        initial_ms in 1u64..5_000,
        max_ms in 5_000u64..120_000,
        factor in 1.1f64..4.0,
        attempt in 1u32..40,
    ) {
        let config = RetryConfig::new()
            .initial_delay(Duration::from_millis(initial_ms))
            .max_delay(Duration::from_millis(max_ms))
            .factor(factor);

        let delay = config.delay_for_attempt(attempt);
        let next = config.delay_for_attempt(attempt + 1);
        let uncapped = initial_ms as f64 / 1000.0 * factor.powi(attempt as i32 - 1);
        let expected = uncapped.min(max_ms as f64 / 1000.0);

        prop_assert!(delay <= Duration::from_millis(max_ms));
        prop_assert!(next >= delay);
        prop_assert!((delay.as_secs_f64() - expected).abs() < 1e-6);
    }
}
