//! Property-Based Tests for the Rate Limiter
//!
//! # Test Strategies
//!
//! - **Window bound**: under any sequence of clock advances and checks, the
//!   number of permitted checks inside any trailing window never exceeds the
//!   limit
//! - **Saturation**: a key that is denied stays denied until the oldest
//!   permitted action leaves the window
//! - **Independence**: traffic on one key never changes decisions on another
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib rate_limit::proptests
//! ```

use proptest::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::rate_limit::{ManualClock, RateLimit, RateLimiter, RateLimiterConfig};

fn manual_limiter() -> (RateLimiter, ManualClock) {
    let clock = ManualClock::new();
    let limiter = RateLimiter::with_clock(RateLimiterConfig::default(), Arc::new(clock.clone()));
    (limiter, clock)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// No trailing window ever holds more than max permitted checks
    #[test]
    fn prop_never_exceeds_limit_in_any_window(
        max in 1u32..8,
        window_ms in 1u64..500,
        steps in prop::collection::vec(0u64..200, 1..200),
    ) {
        let (limiter, clock) = manual_limiter();
        let limit = RateLimit::new(max, Duration::from_millis(window_ms));
        let window = limit.window();
        let mut now = Instant::now();
        let mut permitted: Vec<Instant> = Vec::new();

        for advance in steps {
            clock.advance(Duration::from_millis(advance));
            now += Duration::from_millis(advance);

            if limiter.check("key", &limit).allowed {
                permitted.push(now);
            }

            let in_window = permitted
                .iter()
                .filter(|&&t| now.duration_since(t) < window)
                .count();
            prop_assert!(in_window <= max as usize, "{} permitted within {:?}", in_window, window);
        }
    }

    /// Once full, a key is denied until the oldest entry expires, then admitted
    #[test]
    fn prop_denied_until_oldest_expires(
        max in 1u32..10,
        window_ms in 10u64..1000,
    ) {
        let (limiter, clock) = manual_limiter();
        let limit = RateLimit::new(max, Duration::from_millis(window_ms));

        for _ in 0..max {
            prop_assert!(limiter.check("key", &limit).allowed);
        }
        let denied = limiter.check("key", &limit);
        prop_assert!(!denied.allowed);
        prop_assert_eq!(denied.retry_after, Some(limit.window()));

        clock.advance(limit.window() - Duration::from_millis(1));
        prop_assert!(!limiter.check("key", &limit).allowed);

        clock.advance(Duration::from_millis(1));
        prop_assert!(limiter.check("key", &limit).allowed);
    }

    /// Decisions for one key do not depend on traffic to other keys
    #[test]
    fn prop_keys_are_independent(
        noise in prop::collection::vec(0usize..5, 0..100),
        max in 1u32..5,
    ) {
        let (limiter, _clock) = manual_limiter();
        let limit = RateLimit::per_minute(max);

        for key in noise {
            limiter.check(format!("noise-{}", key).as_str(), &limit);
        }

        for expected_remaining in (0..max).rev() {
            let decision = limiter.check("quiet", &limit);
            prop_assert!(decision.allowed);
            prop_assert_eq!(decision.remaining, expected_remaining);
        }
        prop_assert!(!limiter.check("quiet", &limit).allowed);
    }
}
