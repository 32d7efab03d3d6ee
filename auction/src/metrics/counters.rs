use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub auctions: Arc<AtomicU64>,
    pub served: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
    pub timed_out: Arc<AtomicU64>,
    pub replayed: Arc<AtomicU64>,

    // per-candidate
    pub below_floor: Arc<AtomicU64>,
    pub scoring_failures: Arc<AtomicU64>,

    // store
    pub persist_retries: Arc<AtomicU64>,
}

/// Point-in-time copy of [`Counters`], for logs and CLI output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub auctions: u64,
    pub served: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub replayed: u64,
    pub below_floor: u64,
    pub scoring_failures: u64,
    pub persist_retries: u64,
}

impl Counters {
    pub fn snapshot(&self) -> CountersSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            auctions: get(&self.auctions),
            served: get(&self.served),
            failed: get(&self.failed),
            timed_out: get(&self.timed_out),
            replayed: get(&self.replayed),
            below_floor: get(&self.below_floor),
            scoring_failures: get(&self.scoring_failures),
            persist_retries: get(&self.persist_retries),
        }
    }
}

pub(crate) fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_cells() {
        let a = Counters::default();
        let b = a.clone();
        bump(&a.served, 2);
        bump(&b.replayed, 1);

        let snap = b.snapshot();
        assert_eq!(snap.served, 2);
        assert_eq!(snap.replayed, 1);
        assert_eq!(snap.auctions, 0);
    }
}
