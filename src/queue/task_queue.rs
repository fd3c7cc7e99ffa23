//! Task Queue
//!
//! The queue owns pending jobs and guarantees they run one at a time, in
//! insertion order, on a single worker task spawned on demand.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

use super::config::QueueConfig;
use super::error::QueueError;
use super::job::{Job, JobFailure, JobId};
use super::worker;
use crate::metrics;

pub(crate) type FailureHook = Arc<dyn Fn(&JobFailure) + Send + Sync>;

/// A job together with the id it was assigned at insertion
pub(crate) struct QueuedJob {
    pub(crate) id: JobId,
    pub(crate) job: Job,
}

/// Everything guarded by the queue lock.
///
/// `pending` and `worker_active` must only change together under this lock:
/// the worker's "empty, so go idle" step and `enqueue`'s "append, then start
/// a worker if none is active" step are mutually exclusive.
pub(crate) struct QueueState {
    pub(crate) pending: VecDeque<QueuedJob>,
    pub(crate) worker_active: bool,
    pub(crate) workers_running: usize,
    pub(crate) peak_workers: usize,
    pub(crate) closed: bool,
    next_id: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) enqueued: AtomicU64,
    pub(crate) succeeded: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) panicked: AtomicU64,
}

/// State shared between queue handles and the worker task
pub(crate) struct Shared {
    pub(crate) config: QueueConfig,
    state: Mutex<QueueState>,
    /// `true` while no worker is draining (and therefore nothing is pending)
    pub(crate) idle_tx: watch::Sender<bool>,
    shutdown_tx: watch::Sender<bool>,
    pub(crate) counters: Counters,
    failures: Mutex<VecDeque<JobFailure>>,
    hooks: Mutex<Vec<FailureHook>>,
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keep the failure in the bounded history
    pub(crate) fn remember_failure(&self, failure: &JobFailure) {
        let limit = self.config.failure_history;
        if limit == 0 {
            return;
        }
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        failures.push_back(failure.clone());
        while failures.len() > limit {
            failures.pop_front();
        }
    }

    pub(crate) fn failure_hooks(&self) -> Vec<FailureHook> {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Point-in-time counters for a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue name
    pub name: String,

    /// Jobs accepted by `enqueue`
    pub enqueued: u64,

    /// Jobs whose handler returned `Ok`
    pub succeeded: u64,

    /// Jobs whose handler returned an error
    pub failed: u64,

    /// Jobs whose handler panicked
    pub panicked: u64,

    /// Jobs waiting for the worker
    pub pending: usize,

    /// Whether a worker is currently draining
    pub worker_active: bool,

    /// Highest number of simultaneously running workers ever observed
    pub peak_workers: usize,

    /// Whether the queue has been shut down
    pub closed: bool,
}

impl QueueStats {
    /// Jobs that have finished, successfully or not
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed + self.panicked
    }
}

/// Serialized, FIFO, single-worker job queue.
///
/// Cloning produces another handle to the same queue.
///
/// # Example
///
/// ```
/// use taskgate::queue::{QueueConfig, TaskQueue};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let queue = TaskQueue::new(QueueConfig::named("emails"))?;
///     queue.enqueue_with("alice@example.com".to_string(), |to| async move {
///         tracing::info!(%to, "sending welcome email");
///         Ok(())
///     })?;
///     queue.drain(None).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
    handle: Handle,
}

impl TaskQueue {
    /// Create a queue whose worker runs on the current tokio runtime
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NoRuntime`] when called outside a tokio runtime.
    pub fn new(config: QueueConfig) -> Result<Self, QueueError> {
        let handle = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        Ok(Self::with_handle(config, handle))
    }

    /// Create a queue whose worker runs on the given runtime
    pub fn with_handle(config: QueueConfig, handle: Handle) -> Self {
        info!("Creating task queue '{}'", config.name);
        let (idle_tx, _) = watch::channel(true);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    worker_active: false,
                    workers_running: 0,
                    peak_workers: 0,
                    closed: false,
                    next_id: 1,
                }),
                idle_tx,
                shutdown_tx,
                counters: Counters::default(),
                failures: Mutex::new(VecDeque::new()),
                hooks: Mutex::new(Vec::new()),
            }),
            handle,
        }
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Queue configuration
    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Append a job and make sure a worker is draining.
    ///
    /// Returns as soon as the job is queued; the handler runs later on the
    /// worker task. Handler failures are reported through logs, metrics,
    /// [`recent_failures`](Self::recent_failures) and
    /// [`on_failure`](Self::on_failure) hooks, never through this call.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Shutdown`] after [`shutdown`](Self::shutdown).
    pub fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        let (id, start_worker) = {
            let mut state = self.shared.lock_state();
            if state.closed {
                return Err(QueueError::Shutdown(self.shared.config.name.clone()));
            }

            let id = JobId::new(state.next_id);
            state.next_id += 1;
            state.pending.push_back(QueuedJob { id, job });

            let start_worker = !state.worker_active;
            if start_worker {
                state.worker_active = true;
                self.shared.idle_tx.send_replace(false);
            }

            self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            metrics::QUEUE_DEPTH
                .with_label_values(&[self.name()])
                .set(state.pending.len() as i64);
            (id, start_worker)
        };

        metrics::JOBS_ENQUEUED_TOTAL
            .with_label_values(&[self.name()])
            .inc();
        debug!(queue = %self.name(), job_id = %id, "Job enqueued");

        if start_worker {
            self.handle.spawn(worker::run(Arc::clone(&self.shared)));
        }

        Ok(id)
    }

    /// Build a job from a payload and handler and enqueue it
    pub fn enqueue_with<P, F, Fut>(&self, payload: P, handler: F) -> Result<JobId, QueueError>
    where
        P: Send + 'static,
        F: FnOnce(P) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.enqueue(Job::new(payload, handler))
    }

    /// Wait until nothing is pending and no worker is running.
    ///
    /// With a deadline, gives up after it elapses; in-flight work is never
    /// cancelled. Jobs enqueued while waiting are waited for as well.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::DrainTimeout`] if the deadline elapses first.
    pub async fn drain(&self, deadline: Option<Duration>) -> Result<(), QueueError> {
        let mut idle_rx = self.shared.idle_tx.subscribe();

        match deadline {
            None => {
                // The sender lives in `shared`, so this cannot observe a closed channel
                let _ = idle_rx.wait_for(|idle| *idle).await;
                Ok(())
            }
            Some(limit) => {
                let waited = tokio::time::timeout(limit, async {
                    let _ = idle_rx.wait_for(|idle| *idle).await;
                })
                .await;

                match waited {
                    Ok(()) => Ok(()),
                    Err(_) => Err(QueueError::DrainTimeout {
                        waited: limit,
                        pending: self.len(),
                    }),
                }
            }
        }
    }

    /// Reject further enqueues. Jobs already queued still run.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock_state();
        if !state.closed {
            state.closed = true;
            self.shared.shutdown_tx.send_replace(true);
            info!(
                "Task queue '{}' shut down with {} job(s) pending",
                self.name(),
                state.pending.len()
            );
        }
    }

    /// Shut down, then wait for the remaining jobs
    pub async fn shutdown_and_drain(&self, deadline: Option<Duration>) -> Result<(), QueueError> {
        self.shutdown();
        self.drain(deadline).await
    }

    /// Signal that flips to `true` on shutdown.
    ///
    /// Long-running handlers can capture this to stop early; the queue itself
    /// never cancels a running job.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shared.shutdown_tx.subscribe()
    }

    /// Register a callback invoked with every job failure.
    ///
    /// Hooks run on the worker task, outside the queue lock. A panicking hook
    /// is logged and does not stop the worker.
    pub fn on_failure<F>(&self, hook: F)
    where
        F: Fn(&JobFailure) + Send + Sync + 'static,
    {
        self.shared
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    /// Most recent failures, oldest first
    pub fn recent_failures(&self) -> Vec<JobFailure> {
        self.shared
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Number of jobs waiting for the worker
    pub fn len(&self) -> usize {
        self.shared.lock_state().pending.len()
    }

    /// Whether no jobs are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether nothing is pending and no worker is running
    pub fn is_idle(&self) -> bool {
        let state = self.shared.lock_state();
        !state.worker_active && state.pending.is_empty()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.shared.lock_state().closed
    }

    /// Snapshot of queue counters
    pub fn stats(&self) -> QueueStats {
        let (pending, worker_active, peak_workers, closed) = {
            let state = self.shared.lock_state();
            (
                state.pending.len(),
                state.worker_active,
                state.peak_workers,
                state.closed,
            )
        };
        let counters = &self.shared.counters;

        QueueStats {
            name: self.shared.config.name.clone(),
            enqueued: counters.enqueued.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            panicked: counters.panicked.load(Ordering::Relaxed),
            pending,
            worker_active,
            peak_workers,
            closed,
        }
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.shared.config.name)
            .field("pending", &self.len())
            .finish()
    }
}
