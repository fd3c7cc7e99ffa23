//! Job Types
//!
//! A job is a deferred unit of work: a payload captured by a handler that is
//! invoked lazily by the queue worker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Identifier assigned to a job when it is inserted into a queue.
///
/// Ids increase with insertion order, so they also describe execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Handler for a typed payload, for callers that prefer a struct over a closure.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use taskgate::queue::JobHandler;
///
/// struct SendEmail;
///
/// #[async_trait]
/// impl JobHandler<String> for SendEmail {
///     async fn handle(&self, recipient: String) -> anyhow::Result<()> {
///         tracing::info!(%recipient, "sending email");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler<P: Send + 'static>: Send + Sync {
    async fn handle(&self, payload: P) -> anyhow::Result<()>;
}

type Thunk = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// A unit of work owned by the queue until the worker runs it.
pub struct Job {
    name: Option<String>,
    thunk: Thunk,
}

impl Job {
    /// Create a job from a payload and the handler that consumes it.
    ///
    /// The handler is not called until the worker reaches this job.
    pub fn new<P, F, Fut>(payload: P, handler: F) -> Self
    where
        P: Send + 'static,
        F: FnOnce(P) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: None,
            thunk: Box::new(move || Box::pin(handler(payload))),
        }
    }

    /// Create a job that runs a [`JobHandler`] with the given payload
    pub fn from_handler<P>(payload: P, handler: Arc<dyn JobHandler<P>>) -> Self
    where
        P: Send + 'static,
    {
        Self {
            name: None,
            thunk: Box::new(move || Box::pin(async move { handler.handle(payload).await })),
        }
    }

    /// Create a job from a payload-free async closure
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new((), move |()| f())
    }

    /// Attach a label used in logs and failure reports
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Label, if one was attached
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Invoke the handler and return its future. Consumes the job.
    pub(crate) fn into_future(self) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.thunk)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish_non_exhaustive()
    }
}

/// How a job's handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Handler returned an error
    Error,
    /// Handler panicked
    Panic,
}

impl FailureKind {
    /// Label used for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Error => "error",
            FailureKind::Panic => "panic",
        }
    }
}

/// Report of a failed job, delivered to failure hooks and kept in the
/// queue's recent-failure history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    /// Id of the failed job
    pub job_id: JobId,

    /// Job label, if any
    pub name: Option<String>,

    /// Name of the queue that ran the job
    pub queue: String,

    /// Error or panic
    pub kind: FailureKind,

    /// Error chain or panic message
    pub message: String,

    /// When the failure was observed
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Doubler {
        seen: Arc<std::sync::Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl JobHandler<u32> for Doubler {
        async fn handle(&self, payload: u32) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(payload * 2);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handler_is_lazy() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let job = Job::new(7u32, move |_| {
            flag.store(true, Ordering::SeqCst);
            async { Ok(()) }
        });

        assert!(!called.load(Ordering::SeqCst));
        let fut = job.into_future();
        assert!(called.load(Ordering::SeqCst));
        fut.await.unwrap();
    }

    #[tokio::test]
    async fn test_from_handler() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let job = Job::from_handler(21u32, Arc::new(Doubler { seen: seen.clone() }));
        job.into_future().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }

    #[test]
    fn test_job_name() {
        let job = Job::from_fn(|| async { Ok(()) }).with_name("reindex");
        assert_eq!(job.name(), Some("reindex"));
        assert!(format!("{:?}", job).contains("reindex"));
    }

    #[test]
    fn test_job_id_display_and_order() {
        assert_eq!(JobId::new(3).to_string(), "job-3");
        assert!(JobId::new(1) < JobId::new(2));
    }

    #[test]
    fn test_failure_serialization() {
        let failure = JobFailure {
            job_id: JobId::new(9),
            name: Some("thumbnail".to_string()),
            queue: "media".to_string(),
            kind: FailureKind::Panic,
            message: "boom".to_string(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "panic");
        assert_eq!(json["job_id"], 9);
    }
}
