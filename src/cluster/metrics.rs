//! Per-node counters
//!
//! Atomic counters updated on the hot path of remote reads, plus the
//! back-substitution window used to check the hand-off order between nodes.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Debug, Default, Clone, Copy)]
struct Window {
    started: Option<Instant>,
    finished: Option<Instant>,
}

/// Node metrics
#[derive(Debug, Default)]
pub struct NodeMetrics {
    /// Remote reads this node issued as a caller
    remote_reads_issued: AtomicU64,
    /// Remote reads served from this node's datastore
    remote_reads_served: AtomicU64,
    /// Reads currently being served from this node's datastore
    serving: AtomicUsize,
    /// Highest value `serving` ever reached
    peak_serving: AtomicUsize,
    /// Barrier rounds completed by this node
    barrier_rounds: AtomicU64,
    back_substitution: Mutex<Window>,
}

/// Decrements the in-flight count when a served read finishes
pub(crate) struct ServingGuard<'a> {
    serving: &'a AtomicUsize,
}

impl Drop for ServingGuard<'_> {
    fn drop(&mut self) {
        self.serving.fetch_sub(1, Ordering::AcqRel);
    }
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_remote_read_issued(&self) {
        self.remote_reads_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn begin_serving(&self) -> ServingGuard<'_> {
        let now = self.serving.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_serving.fetch_max(now, Ordering::AcqRel);
        self.remote_reads_served.fetch_add(1, Ordering::Relaxed);
        ServingGuard {
            serving: &self.serving,
        }
    }

    pub(crate) fn record_barrier_round(&self) {
        self.barrier_rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) async fn mark_back_substitution_started(&self) {
        self.back_substitution.lock().await.started = Some(Instant::now());
    }

    pub(crate) async fn mark_back_substitution_finished(&self) {
        self.back_substitution.lock().await.finished = Some(Instant::now());
    }

    /// Point-in-time copy of all counters
    pub async fn snapshot(&self) -> NodeMetricsSnapshot {
        let window = *self.back_substitution.lock().await;
        NodeMetricsSnapshot {
            remote_reads_issued: self.remote_reads_issued.load(Ordering::Relaxed),
            remote_reads_served: self.remote_reads_served.load(Ordering::Relaxed),
            serving: self.serving.load(Ordering::Acquire),
            peak_serving: self.peak_serving.load(Ordering::Acquire),
            barrier_rounds: self.barrier_rounds.load(Ordering::Relaxed),
            back_substitution_started: window.started,
            back_substitution_finished: window.finished,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeMetricsSnapshot {
    pub remote_reads_issued: u64,
    pub remote_reads_served: u64,
    pub serving: usize,
    pub peak_serving: usize,
    pub barrier_rounds: u64,
    #[serde(skip)]
    pub back_substitution_started: Option<Instant>,
    #[serde(skip)]
    pub back_substitution_finished: Option<Instant>,
}
