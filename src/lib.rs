//! Taskgate Library
//!
//! Two in-process concurrency primitives for service code:
//!
//! - [`queue::TaskQueue`]: fire-and-forget background jobs, run one at a time
//!   in enqueue order, with per-job failure isolation
//! - [`rate_limit::RateLimiter`]: per-key sliding-window admission control
//!
//! plus the configuration, logging and metrics plumbing the `taskgate` binary
//! is built from.
//!
//! ```no_run
//! use taskgate::queue::{QueueConfig, TaskQueue};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let queue = TaskQueue::new(QueueConfig::named("emails"))?;
//! queue.enqueue_with("welcome@example.com".to_string(), |to| async move {
//!     tracing::info!(%to, "sending welcome mail");
//!     Ok(())
//! })?;
//! queue.drain(None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod rate_limit;
