// Queue worker - drains pending jobs one at a time
//
// Exactly one worker runs per queue while jobs are pending. It exits only
// when it finds the queue empty, and it clears `worker_active` in the same
// critical section as that emptiness check. If it unwinds or is dropped
// anywhere else, `ExitGuard` restores the flags and hands pending work to a
// fresh worker.

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use super::job::{FailureKind, JobFailure};
use super::task_queue::{QueuedJob, Shared};
use crate::metrics;

/// Worker entry point, spawned by `enqueue` after it sets `worker_active`
pub(crate) async fn run(shared: Arc<Shared>) {
    let mut guard = ExitGuard {
        shared: Arc::clone(&shared),
        finished: false,
    };
    {
        let mut state = shared.lock_state();
        state.workers_running += 1;
        state.peak_workers = state.peak_workers.max(state.workers_running);
    }
    debug!(queue = %shared.config.name, "Worker started");

    loop {
        let next = {
            let mut state = shared.lock_state();
            let next = state.pending.pop_front();
            metrics::QUEUE_DEPTH
                .with_label_values(&[&shared.config.name])
                .set(state.pending.len() as i64);

            match next {
                Some(queued) => queued,
                None => {
                    state.workers_running -= 1;
                    state.worker_active = false;
                    shared.idle_tx.send_replace(true);
                    guard.finished = true;
                    break;
                }
            }
        };

        execute(&shared, next).await;
    }

    debug!(queue = %shared.config.name, "Worker idle, exiting");
}

/// Restores queue state when a worker ends without reaching its idle branch
struct ExitGuard {
    shared: Arc<Shared>,
    finished: bool,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let restart = {
            let mut state = self.shared.lock_state();
            state.workers_running = state.workers_running.saturating_sub(1);
            if state.pending.is_empty() {
                state.worker_active = false;
                self.shared.idle_tx.send_replace(true);
                None
            } else {
                match Handle::try_current() {
                    Ok(handle) => Some(handle),
                    Err(_) => {
                        // The next enqueue starts a worker
                        state.worker_active = false;
                        None
                    }
                }
            }
        };

        error!(
            queue = %self.shared.config.name,
            restarted = restart.is_some(),
            "Worker exited unexpectedly"
        );
        if let Some(handle) = restart {
            handle.spawn(run(Arc::clone(&self.shared)));
        }
    }
}

/// Run one job outside the queue lock, isolating errors and panics
async fn execute(shared: &Shared, queued: QueuedJob) {
    let QueuedJob { id, job } = queued;
    let name = job.name().map(str::to_owned);
    let queue = shared.config.name.as_str();
    let started = Instant::now();

    // Building the future runs the handler's synchronous prologue, and
    // rendering or dropping the error runs user code, so both belong inside
    // the unwind boundary as well
    let outcome = AssertUnwindSafe(async move {
        job.into_future()
            .await
            .map_err(|err| format!("{:#}", err))
    })
    .catch_unwind()
    .await;

    let elapsed = started.elapsed();
    metrics::JOB_DURATION_SECONDS
        .with_label_values(&[queue])
        .observe(elapsed.as_secs_f64());

    let (kind, message) = match outcome {
        Ok(Ok(())) => {
            shared.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            metrics::JOBS_FINISHED_TOTAL
                .with_label_values(&[queue, "ok"])
                .inc();
            debug!(
                queue,
                job_id = %id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job completed"
            );
            return;
        }
        Ok(Err(message)) => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(queue, job_id = %id, job_name = ?name, error = %message, "Job failed");
            (FailureKind::Error, message)
        }
        Err(payload) => {
            shared.counters.panicked.fetch_add(1, Ordering::Relaxed);
            let message = panic_message(payload.as_ref());
            error!(queue, job_id = %id, job_name = ?name, panic = %message, "Job panicked");
            (FailureKind::Panic, message)
        }
    };

    metrics::JOBS_FINISHED_TOTAL
        .with_label_values(&[queue, kind.as_str()])
        .inc();

    let failure = JobFailure {
        job_id: id,
        name,
        queue: queue.to_string(),
        kind,
        message,
        at: Utc::now(),
    };
    shared.remember_failure(&failure);

    for hook in shared.failure_hooks() {
        let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| hook(&failure)));
        if delivered.is_err() {
            error!(queue, job_id = %id, "Failure hook panicked");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(static_str.as_ref()), "static");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
