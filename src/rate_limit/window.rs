//! Per-key sliding window
//!
//! A [`RateWindow`] is the log of permitted actions for one key. Timestamps
//! are appended in ascending order, so eviction only ever pops from the front.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::config::RateLimit;

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the action is permitted (and was recorded)
    pub allowed: bool,

    /// Permitted actions left in the current window after this check
    pub remaining: u32,

    /// How long until the next action could be permitted, when denied.
    ///
    /// `None` when allowed, when the limit never permits anything, or when
    /// the window reaches past the clock's range.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    /// Create an allowed result
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: None,
        }
    }

    /// Create a denied result
    pub fn denied(retry_after: Option<Duration>) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after,
        }
    }
}

/// Timestamps of recently permitted actions for one key
#[derive(Debug, Clone)]
pub struct RateWindow {
    timestamps: VecDeque<Instant>,
    window: Duration,
    last_seen: Instant,
}

impl RateWindow {
    /// Create an empty window
    pub fn new(now: Instant) -> Self {
        Self {
            timestamps: VecDeque::new(),
            window: Duration::ZERO,
            last_seen: now,
        }
    }

    /// Drop timestamps that are no longer inside `window` as of `now`.
    ///
    /// A timestamp exactly `window` old is outside the window.
    pub fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Evict, then record `now` if the limit permits it.
    pub fn try_acquire(&mut self, now: Instant, limit: &RateLimit) -> RateLimitDecision {
        self.last_seen = now;
        self.window = limit.window();
        self.evict(now, limit.window());

        let max = limit.max_requests();
        if max == 0 {
            return RateLimitDecision::denied(None);
        }
        if limit.window().is_zero() {
            // Nothing is remembered, so nothing can ever be over the limit
            return RateLimitDecision::allowed(max);
        }

        let used = self.timestamps.len();
        if used >= max as usize {
            let retry_after = self
                .timestamps
                .get(used - max as usize)
                .and_then(|&t| t.checked_add(limit.window()))
                .map(|frees_at| frees_at.saturating_duration_since(now));
            return RateLimitDecision::denied(retry_after);
        }

        self.timestamps.push_back(now);
        RateLimitDecision::allowed(max - self.timestamps.len() as u32)
    }

    /// Permitted actions left under `limit` as of `now`, without recording anything
    pub fn remaining(&mut self, now: Instant, limit: &RateLimit) -> u32 {
        self.evict(now, limit.window());
        if limit.window().is_zero() {
            return limit.max_requests();
        }
        limit
            .max_requests()
            .saturating_sub(self.timestamps.len() as u32)
    }

    /// Whether this bucket can be removed: empty under its last window and
    /// untouched for at least `grace`
    pub fn is_expired(&mut self, now: Instant, grace: Duration) -> bool {
        self.evict(now, self.window);
        self.timestamps.is_empty() && now.saturating_duration_since(self.last_seen) >= grace
    }

    /// Recorded timestamps still held
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether no timestamps are held
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
