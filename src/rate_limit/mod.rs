//! Sliding-Window Rate Limiting Module
//!
//! This module answers "is this action allowed right now for this key" using a
//! trailing time window, independently per key.
//!
//! # Features
//!
//! - Sliding window log: each key keeps the timestamps of its recent permitted
//!   actions, evicted lazily on access
//! - Rejected attempts are never recorded
//! - Per-key locking: checks on different keys do not contend
//! - Bounded memory: idle, empty buckets are swept periodically or when the
//!   key count crosses a threshold
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RateLimiter                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RwLock<HashMap<Key, Mutex<RateWindow>>>                    │
//! │   read lock  + bucket mutex  ── check existing key          │
//! │   write lock                 ── create key / sweep          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Clock (SystemClock | ManualClock)                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod window;

#[cfg(test)]
mod proptests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RateLimit, RateLimitPolicy, RateLimiterConfig};
pub use error::RateLimitError;
pub use limiter::RateLimiter;
pub use window::{RateLimitDecision, RateWindow};
