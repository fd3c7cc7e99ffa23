//! Task Queue Error Types

use std::time::Duration;

/// Errors surfaced to callers of [`TaskQueue`](super::TaskQueue).
///
/// Job failures are not part of this type: they never propagate to the
/// caller of `enqueue` and are reported through [`JobFailure`](super::JobFailure).
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Enqueue attempted after an explicit shutdown
    #[error("Queue '{0}' has been shut down")]
    Shutdown(String),

    /// Drain deadline elapsed before the queue went idle
    #[error("Queue drain timed out after {waited:?} with {pending} job(s) pending")]
    DrainTimeout {
        /// How long the caller waited
        waited: Duration,
        /// Jobs still pending when the deadline elapsed
        pending: usize,
    },

    /// No tokio runtime was available to host the worker task
    #[error("No tokio runtime available to run the queue worker")]
    NoRuntime,
}
