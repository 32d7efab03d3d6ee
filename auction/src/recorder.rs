//! Durable, exactly-once recording of auction outcomes.

use std::sync::Arc;
use std::time::Duration;

use common::logger::warn_if_slow;
use tracing::{debug, instrument, warn};

use crate::error::AuctionError;
use crate::metrics::counters::{Counters, bump};
use crate::model::AuctionResult;
use crate::store::{ResultStore, UpsertOutcome, WinCharge};

/// What the store holds for the request after recording.
#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    /// This call inserted the result and applied its charge.
    Applied(AuctionResult),
    /// Another call got there first; this is the stored result.
    Replayed(AuctionResult),
}

impl Recorded {
    pub fn into_result(self) -> AuctionResult {
        match self {
            Recorded::Applied(r) | Recorded::Replayed(r) => r,
        }
    }
}

pub struct OutcomeRecorder {
    results: Arc<dyn ResultStore>,
    retries: u32,
    counters: Counters,
}

impl OutcomeRecorder {
    pub fn new(results: Arc<dyn ResultStore>, retries: u32, counters: Counters) -> Self {
        Self {
            results,
            retries,
            counters,
        }
    }

    /// Writes `result` and, for a winner, its charge in one atomic upsert.
    ///
    /// The upsert is idempotent on the request id, so a retry after an
    /// ambiguous failure can never charge twice.
    #[instrument(
        skip(self, result, charge),
        target = "recorder",
        fields(request_id = %result.request_id, status = %result.status)
    )]
    pub async fn record(
        &self,
        result: AuctionResult,
        charge: Option<WinCharge>,
    ) -> Result<Recorded, AuctionError> {
        let mut last_err = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                bump(&self.counters.persist_retries, 1);
            }

            let outcome = warn_if_slow("result_upsert", Duration::from_millis(20), async {
                self.results.upsert(&result, charge.as_ref()).await
            })
            .await;

            match outcome {
                Ok(UpsertOutcome::Applied) => {
                    debug!(attempt, "auction outcome recorded");
                    return Ok(Recorded::Applied(result));
                }
                Ok(UpsertOutcome::AlreadyPresent) => {
                    debug!(attempt, "result already recorded; returning stored result");
                    return self.stored(&result.request_id).await.map(Recorded::Replayed);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "result upsert failed");
                    last_err = Some(e);
                }
            }
        }

        Err(AuctionError::Persistence(
            last_err.map_or_else(|| "no attempt made".to_string(), |e| format!("{e:#}")),
        ))
    }

    async fn stored(&self, request_id: &str) -> Result<AuctionResult, AuctionError> {
        match self.results.get_by_request_id(request_id).await {
            Ok(Some(r)) => Ok(r),
            Ok(None) => Err(AuctionError::Persistence(format!(
                "result for {request_id} reported present but not readable"
            ))),
            Err(e) => Err(AuctionError::Persistence(format!("{e:#}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuctionStatus, FailureReason};
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failed(request_id: &str) -> AuctionResult {
        AuctionResult {
            request_id: request_id.into(),
            status: AuctionStatus::Failed,
            failure_reason: Some(FailureReason::NoEligibleCandidates),
            winning_candidate_id: None,
            winning_campaign_id: None,
            clearing_price: 0.0,
            participant_count: 0,
            diagnostics: vec![],
            impression_id: None,
            deal_id: None,
            decided_at_ms: 1,
        }
    }

    /// Fails the first `failures` upserts, then delegates.
    struct Flaky {
        inner: MemoryStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl ResultStore for Flaky {
        async fn get_by_request_id(&self, id: &str) -> anyhow::Result<Option<AuctionResult>> {
            self.inner.get_by_request_id(id).await
        }

        async fn upsert(
            &self,
            result: &AuctionResult,
            charge: Option<&WinCharge>,
        ) -> anyhow::Result<UpsertOutcome> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("database is locked");
            }
            self.inner.upsert(result, charge).await
        }
    }

    fn flaky(failures: u32) -> Arc<Flaky> {
        Arc::new(Flaky {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(failures),
        })
    }

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let store = flaky(1);
        let counters = Counters::default();
        let recorder = OutcomeRecorder::new(store.clone(), 1, counters.clone());

        let out = recorder.record(failed("r1"), None).await.unwrap();
        assert!(matches!(out, Recorded::Applied(_)));
        assert_eq!(counters.snapshot().persist_retries, 1);
        assert_eq!(store.inner.result_count(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let recorder = OutcomeRecorder::new(flaky(5), 1, Counters::default());

        let err = recorder.record(failed("r1"), None).await.unwrap_err();
        assert!(matches!(err, AuctionError::Persistence(ref m) if m.contains("locked")));
    }

    #[tokio::test]
    async fn second_record_returns_the_stored_result() {
        let store = Arc::new(MemoryStore::new());
        let recorder = OutcomeRecorder::new(store, 0, Counters::default());

        let first = failed("r1");
        recorder.record(first.clone(), None).await.unwrap();

        let mut later = failed("r1");
        later.decided_at_ms = 99;
        let out = recorder.record(later, None).await.unwrap();
        assert_eq!(out, Recorded::Replayed(first));
    }
}
