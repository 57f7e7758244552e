//! Shared mining hashrate meter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counts PoW attempts reported by mining workers.
///
/// Workers report in batches, so [`total`](Self::total) lags the true count
/// by at most one batch per running worker.
#[derive(Debug)]
pub struct Hashrate {
    total: AtomicU64,
    started: Instant,
}

impl Default for Hashrate {
    fn default() -> Self {
        Self::new()
    }
}

impl Hashrate {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record `attempts` hash evaluations.
    pub fn mark(&self, attempts: u64) {
        self.total.fetch_add(attempts, Ordering::Relaxed);
    }

    /// Attempts recorded since creation.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Mean attempts per second since creation.
    pub fn rate(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.total() as f64 / secs
        } else {
            0.0
        }
    }
}
