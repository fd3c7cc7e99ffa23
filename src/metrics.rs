// Prometheus metrics for the task queue and rate limiter
//
// Collected in a process-wide registry:
// - Jobs enqueued and finished per queue (counter)
// - Job execution time (histogram)
// - Pending jobs per queue (gauge)
// - Rate limit decisions (counter)
// - Live rate limit buckets (gauge)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Registry, TextEncoder,
};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Queue metrics
    pub static ref JOBS_ENQUEUED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("taskgate_jobs_enqueued_total", "Total number of jobs enqueued"),
        &["queue"]
    ).expect("Failed to create jobs enqueued metric");

    pub static ref JOBS_FINISHED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("taskgate_jobs_finished_total", "Total number of jobs run to completion or failure"),
        &["queue", "status"]
    ).expect("Failed to create jobs finished metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new("taskgate_job_duration_seconds", "Job handler execution time in seconds"),
        &["queue"]
    ).expect("Failed to create job duration metric");

    pub static ref QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        prometheus::Opts::new("taskgate_queue_depth", "Number of jobs waiting for the worker"),
        &["queue"]
    ).expect("Failed to create queue depth metric");

    // Rate limit metrics
    pub static ref RATE_LIMIT_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("taskgate_rate_limit_decisions_total", "Total number of rate limit checks by decision"),
        &["decision"]
    ).expect("Failed to create rate limit decisions metric");

    pub static ref RATE_LIMIT_BUCKETS: IntGauge = IntGauge::new(
        "taskgate_rate_limit_buckets",
        "Number of live per-key rate limit buckets"
    ).expect("Failed to create rate limit buckets metric");
}

/// Register all collectors - call once at startup.
///
/// Collectors update whether or not they are registered; registration only
/// controls what [`gather_metrics`] exports.
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(JOBS_ENQUEUED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOBS_FINISHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMIT_DECISIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMIT_BUCKETS.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
