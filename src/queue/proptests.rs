//! Property-Based Tests for the Task Queue
//!
//! # Test Strategies
//!
//! - **Exactly once**: every enqueued job runs once, no matter how many
//!   producers race on `enqueue`
//! - **Per-producer order**: jobs from one producer run in the order that
//!   producer enqueued them
//! - **Failure isolation**: failing jobs interleaved at random never prevent
//!   later jobs from running
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib queue::proptests
//! ```

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::queue::{Job, QueueConfig, TaskQueue};

async fn reject(_: u32) -> anyhow::Result<()> {
    anyhow::bail!("rejected by test")
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// All jobs from all producers run exactly once and per-producer order holds
    #[test]
    fn prop_concurrent_producers_exactly_once(
        producers in 1usize..6,
        jobs_per_producer in 1usize..40,
    ) {
        let rt = runtime();
        let executed: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));

        let stats = rt.block_on(async {
            let queue = TaskQueue::new(QueueConfig::named("prop-exactly-once")).unwrap();

            let mut handles = Vec::new();
            for producer in 0..producers {
                let queue = queue.clone();
                let executed = executed.clone();
                handles.push(tokio::spawn(async move {
                    for seq in 0..jobs_per_producer {
                        let executed = executed.clone();
                        queue
                            .enqueue_with((producer, seq), move |entry| async move {
                                executed.lock().unwrap().push(entry);
                                Ok(())
                            })
                            .unwrap();
                        if seq % 3 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            queue.drain(Some(Duration::from_secs(10))).await.unwrap();
            queue.stats()
        });

        let executed = executed.lock().unwrap();
        prop_assert_eq!(executed.len(), producers * jobs_per_producer);
        prop_assert_eq!(stats.succeeded as usize, producers * jobs_per_producer);
        prop_assert!(stats.peak_workers <= 1);

        let mut last_seen: HashMap<usize, usize> = HashMap::new();
        for &(producer, seq) in executed.iter() {
            if let Some(&previous) = last_seen.get(&producer) {
                prop_assert!(
                    seq > previous,
                    "producer {} ran {} after {}",
                    producer,
                    seq,
                    previous
                );
            } else {
                prop_assert_eq!(seq, 0);
            }
            last_seen.insert(producer, seq);
        }
    }

    /// Randomly placed failures never block the jobs behind them
    #[test]
    fn prop_failures_are_isolated(outcomes in prop::collection::vec(any::<bool>(), 1..60)) {
        let rt = runtime();
        let succeeded: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let stats = rt.block_on(async {
            let queue = TaskQueue::new(QueueConfig::named("prop-isolation")).unwrap();
            for (index, &ok) in outcomes.iter().enumerate() {
                if ok {
                    let succeeded = succeeded.clone();
                    queue
                        .enqueue_with(index, move |index| async move {
                            succeeded.lock().unwrap().push(index);
                            Ok(())
                        })
                        .unwrap();
                } else {
                    queue.enqueue(Job::new(index as u32, reject)).unwrap();
                }
            }
            queue.drain(Some(Duration::from_secs(10))).await.unwrap();
            queue.stats()
        });

        let expected: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, ok)| **ok)
            .map(|(index, _)| index)
            .collect();
        prop_assert_eq!(succeeded.lock().unwrap().clone(), expected);
        prop_assert_eq!(
            stats.failed as usize,
            outcomes.iter().filter(|ok| !**ok).count()
        );
    }
}
