//! Barrier reuse across many rounds and participant counts

use gauss_cluster::ReentrantBarrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rounds_complete_in_lockstep() {
    for parties in 1..=5 {
        let barrier = Arc::new(ReentrantBarrier::new(parties).unwrap());
        let round_counter = Arc::new(AtomicUsize::new(0));

        let workers = (0..parties).map(|_| {
            let barrier = barrier.clone();
            let round_counter = round_counter.clone();
            tokio::spawn(async move {
                let mut observed = Vec::new();
                for _ in 0..25 {
                    round_counter.fetch_add(1, Ordering::SeqCst);
                    barrier.wait().await.unwrap();
                    observed.push(round_counter.load(Ordering::SeqCst));
                    barrier.wait().await.unwrap();
                }
                observed
            })
        });

        for worker in futures::future::join_all(workers).await {
            let observed = worker.unwrap();
            let expected: Vec<usize> = (1..=25).map(|round| round * parties).collect();
            assert_eq!(observed, expected, "parties = {parties}");
        }
    }
}
