// Taskgate - Main Entry Point
//
// Operator binary for the task queue and rate limiter:
// - Configuration inspection
// - Queue demo under concurrent producers
// - Interactive rate limit checks

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use taskgate::config::{Config, DEFAULT_CONFIG_FILE};
use taskgate::queue::{Job, TaskQueue};
use taskgate::rate_limit::{RateLimit, RateLimiter};
use taskgate::{logging, metrics};
use tracing::{info, warn};

/// Taskgate: serialized background jobs and sliding-window rate limits
#[derive(Parser, Debug)]
#[command(name = "taskgate")]
#[command(author = "Taskgate Contributors")]
#[command(version)]
#[command(about = "In-process task queue and sliding-window rate limiter", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enqueue jobs from concurrent producers, drain, and print queue stats as JSON
    DemoQueue {
        /// Total number of jobs
        #[arg(long, default_value_t = 20)]
        jobs: usize,

        /// Number of concurrent producers
        #[arg(long, default_value_t = 4)]
        producers: usize,

        /// Make every Nth job return an error (0 disables)
        #[arg(long, default_value_t = 0)]
        fail_every: usize,

        /// Make every Nth job panic (0 disables)
        #[arg(long, default_value_t = 0)]
        panic_every: usize,
    },
    /// Run a series of rate limit checks against one key
    CheckLimit {
        /// Key to check
        #[arg(long, default_value = "demo")]
        key: String,

        /// Named policy from the configuration file
        #[arg(long, conflicts_with_all = ["max", "window_ms"])]
        policy: Option<String>,

        /// Maximum permitted actions per window
        #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
        max: i64,

        /// Window length in milliseconds
        #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
        window_ms: i64,

        /// Number of checks to perform
        #[arg(long, default_value_t = 5)]
        attempts: usize,

        /// Pause between checks in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_from_path(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    logging::init(&config.logging, args.verbose)?;

    if config.metrics.enabled {
        metrics::init().context("Failed to register metrics")?;
    }

    match args.command {
        Commands::DemoQueue {
            jobs,
            producers,
            fail_every,
            panic_every,
        } => {
            demo_queue(&config, jobs, producers, fail_every, panic_every).await?;
        }
        Commands::CheckLimit {
            key,
            policy,
            max,
            window_ms,
            attempts,
            interval_ms,
        } => {
            let limit = match policy {
                Some(name) => config
                    .rate_limit
                    .policy(&name)
                    .with_context(|| format!("Unknown rate limit policy '{}'", name))?,
                None => RateLimit::try_new(max, chrono::Duration::milliseconds(window_ms))?,
            };
            check_limit(&config, &key, limit, attempts, interval_ms).await?;
        }
        Commands::ShowConfig => {
            print!("{}", config.to_toml()?);
        }
    }

    if config.metrics.enabled {
        print!("{}", metrics::gather_metrics()?);
    }

    Ok(())
}

/// Run the queue under `producers` concurrent producers and report stats
async fn demo_queue(
    config: &Config,
    jobs: usize,
    producers: usize,
    fail_every: usize,
    panic_every: usize,
) -> Result<()> {
    let queue = TaskQueue::new(config.queue.clone())?;
    let producers = producers.max(1);
    info!(jobs, producers, "Starting queue demo");

    let mut handles = Vec::with_capacity(producers);
    for producer in 0..producers {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            for n in (producer..jobs).step_by(producers) {
                let number = n + 1;
                let job = Job::new(number, move |number: usize| async move {
                    if panic_every > 0 && number % panic_every == 0 {
                        panic!("demo job {} panicked", number);
                    }
                    if fail_every > 0 && number % fail_every == 0 {
                        anyhow::bail!("demo job {} failed", number);
                    }
                    tokio::task::yield_now().await;
                    Ok(())
                })
                .with_name(format!("demo-{}", number));
                queue.enqueue(job)?;
            }
            Ok::<(), taskgate::queue::QueueError>(())
        }));
    }

    for handle in handles {
        handle.await.context("Producer task failed")??;
    }

    if let Err(e) = queue.shutdown_and_drain(Some(config.queue.drain_timeout())).await {
        warn!("Queue did not drain: {}", e);
    }

    let stats = queue.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Perform `attempts` checks against `key`, printing one line per decision
async fn check_limit(
    config: &Config,
    key: &str,
    limit: RateLimit,
    attempts: usize,
    interval_ms: u64,
) -> Result<()> {
    let limiter: Arc<RateLimiter> = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let sweeper = limiter.spawn_sweeper();

    for attempt in 1..=attempts {
        let decision = limiter.check(key, &limit);
        if decision.allowed {
            println!("attempt {}: allowed (remaining {})", attempt, decision.remaining);
        } else {
            match decision.retry_after {
                Some(wait) => println!(
                    "attempt {}: denied (retry after {}ms)",
                    attempt,
                    wait.as_millis()
                ),
                None => println!("attempt {}: denied", attempt),
            }
        }

        if interval_ms > 0 && attempt < attempts {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }

    sweeper.abort();
    Ok(())
}
