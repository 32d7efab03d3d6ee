use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use common::logger::warn_if_slow;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::model::Candidate;
use crate::store::CandidateSource;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SnapshotKey {
    ad_unit_id: String,
    organization_id: String,
}

struct Snapshot {
    loaded_at: Instant,
    candidates: Arc<Vec<Candidate>>,
}

/// Bounded-staleness cache of candidate lists per (ad unit, organization).
///
/// Guarantees:
/// - A snapshot is never served once it is older than `max_staleness`.
/// - Memory is bounded by `capacity`; the oldest snapshot is evicted first.
/// - Concurrent misses may each load; the last load wins.
pub struct CandidateSnapshotCache {
    source: Arc<dyn CandidateSource>,
    max_staleness: Duration,
    capacity: usize,
    entries: Mutex<HashMap<SnapshotKey, Snapshot>>,
}

impl CandidateSnapshotCache {
    pub fn new(source: Arc<dyn CandidateSource>, max_staleness: Duration, capacity: usize) -> Self {
        Self {
            source,
            max_staleness,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns a fresh-enough snapshot, loading it from the source on a miss.
    #[instrument(skip(self), target = "snapshot")]
    pub async fn get(&self, ad_unit_id: &str, organization_id: &str) -> Result<Arc<Vec<Candidate>>> {
        let key = SnapshotKey {
            ad_unit_id: ad_unit_id.to_string(),
            organization_id: organization_id.to_string(),
        };

        if let Some(hit) = self.fresh(&key) {
            return Ok(hit);
        }

        let loaded = warn_if_slow("snapshot_load", Duration::from_millis(50), async {
            self.source.list_eligible(ad_unit_id, organization_id).await
        })
        .await
        .context("candidate source load failed")?;

        let candidates = Arc::new(loaded);
        debug!(count = candidates.len(), "candidate snapshot loaded");

        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, s)| s.loaded_at)
                .map(|(k, _)| k.clone());
            if let Some(victim) = oldest {
                entries.remove(&victim);
                debug!(
                    evicted_ad_unit = %victim.ad_unit_id,
                    evicted_org = %victim.organization_id,
                    "snapshot capacity reached; evicted oldest"
                );
            }
        }
        entries.insert(
            key,
            Snapshot {
                loaded_at: Instant::now(),
                candidates: candidates.clone(),
            },
        );

        Ok(candidates)
    }

    fn fresh(&self, key: &SnapshotKey) -> Option<Arc<Vec<Candidate>>> {
        let entries = self.entries.lock();
        let snap = entries.get(key)?;
        (snap.loaded_at.elapsed() <= self.max_staleness).then(|| snap.candidates.clone())
    }

    /// Drops one snapshot so the next auction reloads it.
    pub fn invalidate(&self, ad_unit_id: &str, organization_id: &str) {
        let key = SnapshotKey {
            ad_unit_id: ad_unit_id.to_string(),
            organization_id: organization_id.to_string(),
        };
        if self.entries.lock().remove(&key).is_some() {
            debug!(ad_unit_id, organization_id, "snapshot invalidated");
        }
    }

    #[instrument(skip(self), target = "snapshot")]
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        info!(count, "snapshot cache cleared");
    }
}
