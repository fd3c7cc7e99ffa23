//! Rate Limiter
//!
//! Keyed collection of [`RateWindow`]s. Checks on a key that already has a
//! bucket hold the map's read lock plus that bucket's mutex, so different
//! keys proceed in parallel while two checks on the same key are linearized.
//! Creating or removing buckets takes the write lock.
//!
//! Inserting a key sweeps inline once the key count reaches a trigger. After
//! every sweep the trigger moves to twice the surviving key count (never
//! below `sweep_threshold`), so a map full of live keys is scanned at most
//! once per doubling.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::clock::{Clock, SystemClock};
use super::config::{RateLimit, RateLimiterConfig, DEFAULT_SWEEP_INTERVAL_SECS};
use super::error::RateLimitError;
use super::window::{RateLimitDecision, RateWindow};
use crate::metrics;

type Buckets<K> = HashMap<K, Mutex<RateWindow>>;

/// Sliding-window rate limiter keyed by `K`.
///
/// # Example
///
/// ```
/// use taskgate::rate_limit::{RateLimiter, RateLimiterConfig};
///
/// let limiter: RateLimiter = RateLimiter::new(RateLimiterConfig::default());
/// let window = chrono::Duration::seconds(1);
///
/// assert!(limiter.check_limit("client-1", 2, window).unwrap());
/// assert!(limiter.check_limit("client-1", 2, window).unwrap());
/// assert!(!limiter.check_limit("client-1", 2, window).unwrap());
/// assert!(limiter.check_limit("client-2", 2, window).unwrap());
/// ```
pub struct RateLimiter<K = String> {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    buckets: RwLock<Buckets<K>>,
    /// Key count at which the next insert sweeps. Written under the write lock.
    sweep_at: AtomicUsize,
    inline_sweeps: AtomicUsize,
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone,
{
    /// Create a limiter on the system clock
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on a caller-supplied clock
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let sweep_at = AtomicUsize::new(config.sweep_threshold);
        Self {
            config,
            clock,
            buckets: RwLock::new(HashMap::new()),
            sweep_at,
            inline_sweeps: AtomicUsize::new(0),
        }
    }

    /// Limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Check whether an action for `key` is permitted under raw caller limits.
    ///
    /// Returns `Ok(true)` and records the action when permitted, `Ok(false)`
    /// without recording anything when denied.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidArgument`] for a negative
    /// `max_requests` or `window`; no state is touched in that case.
    pub fn check_limit<Q>(
        &self,
        key: &Q,
        max_requests: i64,
        window: chrono::Duration,
    ) -> Result<bool, RateLimitError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let limit = RateLimit::try_new(max_requests, window)?;
        Ok(self.check(key, &limit).allowed)
    }

    /// Check whether an action for `key` is permitted under `limit`
    pub fn check<Q>(&self, key: &Q, limit: &RateLimit) -> RateLimitDecision
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let decision = if limit.max_requests() == 0 {
            RateLimitDecision::denied(None)
        } else if limit.window().is_zero() {
            RateLimitDecision::allowed(limit.max_requests())
        } else {
            self.check_bucket(key, limit)
        };

        if decision.allowed {
            metrics::RATE_LIMIT_DECISIONS_TOTAL
                .with_label_values(&["allowed"])
                .inc();
            trace!(remaining = decision.remaining, "Rate limit check allowed");
        } else {
            metrics::RATE_LIMIT_DECISIONS_TOTAL
                .with_label_values(&["denied"])
                .inc();
            debug!(
                max_requests = limit.max_requests(),
                window_ms = limit.window().as_millis() as u64,
                retry_after = ?decision.retry_after,
                "Rate limit check denied"
            );
        }

        decision
    }

    fn check_bucket<Q>(&self, key: &Q, limit: &RateLimit) -> RateLimitDecision
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let existing = {
            let buckets = self.read_buckets();
            buckets.get(key).map(|bucket| {
                let mut window = bucket.lock().unwrap_or_else(PoisonError::into_inner);
                window.try_acquire(self.clock.now(), limit)
            })
        };
        if let Some(decision) = existing {
            return decision;
        }

        let mut buckets = self.write_buckets();
        let now = self.clock.now();
        if !buckets.contains_key(key) {
            if buckets.len() >= self.sweep_at.load(Ordering::Relaxed) {
                self.inline_sweeps.fetch_add(1, Ordering::Relaxed);
                self.sweep_locked(&mut buckets, now);
            }
            buckets.insert(key.to_owned(), Mutex::new(RateWindow::new(now)));
            metrics::RATE_LIMIT_BUCKETS.inc();
        }

        match buckets.get_mut(key) {
            Some(bucket) => bucket
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .try_acquire(now, limit),
            None => RateLimitDecision::denied(None),
        }
    }

    /// Permitted actions left for `key` under `limit`, without recording anything
    pub fn remaining<Q>(&self, key: &Q, limit: &RateLimit) -> u32
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let buckets = self.read_buckets();
        match buckets.get(key) {
            Some(bucket) => bucket
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remaining(self.clock.now(), limit),
            None => limit.max_requests(),
        }
    }

    /// Forget all history for `key`. Returns whether a bucket existed.
    pub fn reset<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.write_buckets().remove(key).is_some();
        if removed {
            metrics::RATE_LIMIT_BUCKETS.dec();
        }
        removed
    }

    /// Remove buckets that are empty and have been idle for the configured
    /// grace period. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut buckets = self.write_buckets();
        let now = self.clock.now();
        self.sweep_locked(&mut buckets, now)
    }

    fn sweep_locked(&self, buckets: &mut Buckets<K>, now: Instant) -> usize {
        let grace = self.config.idle_grace();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            !bucket
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .is_expired(now, grace)
        });

        let removed = before - buckets.len();
        let next = self
            .config
            .sweep_threshold
            .max(buckets.len().saturating_mul(2));
        self.sweep_at.store(next, Ordering::Relaxed);

        if removed > 0 {
            metrics::RATE_LIMIT_BUCKETS.sub(removed as i64);
            debug!(removed, remaining = buckets.len(), "Swept idle rate limit buckets");
        }
        removed
    }

    /// Number of live buckets
    pub fn len(&self) -> usize {
        self.read_buckets().len()
    }

    /// Whether no buckets are live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_buckets(&self) -> RwLockReadGuard<'_, Buckets<K>> {
        self.buckets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_buckets(&self) -> RwLockWriteGuard<'_, Buckets<K>> {
        self.buckets.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Sweep on the configured interval until the limiter is dropped
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let mut interval = self.config.sweep_interval();
        if interval.is_zero() {
            warn!(
                "Rate limit sweep interval is zero, using {}s",
                DEFAULT_SWEEP_INTERVAL_SECS
            );
            interval = Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS);
        }
        self.spawn_sweeper_every(interval)
    }

    /// Sweep every `interval` until the limiter is dropped.
    ///
    /// The task holds only a weak reference, so it never keeps the limiter alive.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero or when called outside a tokio runtime.
    pub fn spawn_sweeper_every(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter = Arc::downgrade(self);
        info!("Starting rate limit sweeper every {:?}", interval);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    debug!("Rate limiter dropped, stopping sweeper");
                    break;
                };
                limiter.sweep();
            }
        })
    }
}

impl<K> std::fmt::Debug for RateLimiter<K>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("buckets", &self.len())
            .field("sweep_at", &self.sweep_at.load(Ordering::Relaxed))
            .field("inline_sweeps", &self.inline_sweeps.load(Ordering::Relaxed))
            .finish()
    }
}
