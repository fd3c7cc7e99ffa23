//! Serialized Task Queue
//!
//! This module provides an in-process queue that runs jobs one at a time, in
//! enqueue order, on a single background worker task.
//!
//! # Features
//!
//! - Fire-and-forget `enqueue` that never waits on job execution
//! - Strict FIFO ordering by insertion under the queue lock
//! - Single-flight worker: at most one drain loop per queue at any instant
//! - Per-job failure isolation (errors and panics are caught and reported)
//! - Bounded-wait `drain` and orderly `shutdown`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  enqueue   ┌──────────────────────────────┐
//! │ caller A │──────────▶ │ Mutex<QueueState>            │
//! ├──────────┤            │  pending: VecDeque<Job>      │
//! │ caller B │──────────▶ │  worker_active: bool         │
//! └──────────┘            └──────────────┬───────────────┘
//!                                        │ pop head / clear flag
//!                                        ▼
//!                           ┌─────────────────────────┐
//!                           │ worker task (one only)  │──▶ handler()
//!                           └─────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod task_queue;
mod worker;

#[cfg(test)]
mod proptests;

pub use config::QueueConfig;
pub use error::QueueError;
pub use job::{FailureKind, Job, JobFailure, JobHandler, JobId};
pub use task_queue::{QueueStats, TaskQueue};
