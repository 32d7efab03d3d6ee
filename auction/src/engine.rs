//! The auction pipeline: validate, snapshot, filter, score, resolve, record.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use common::logger::{TraceId, auction_span, child_span};
use futures::future::try_join_all;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};

use crate::bidding::BidCalculator;
use crate::config::AuctionConfig;
use crate::eligibility::filter_eligible;
use crate::error::AuctionError;
use crate::metrics::counters::{Counters, bump};
use crate::model::{
    AdUnit, AuctionPhase, AuctionResult, AuctionStatus, BidRequest, BudgetState, Candidate,
    Diagnostic, DiagnosticOutcome, FailureReason,
};
use crate::recorder::{OutcomeRecorder, Recorded};
use crate::resolver::{TieBreakPolicy, resolve};
use crate::snapshot::CandidateSnapshotCache;
use crate::store::{AuctionStores, BudgetStore, InventoryDirectory, ResultStore, WinCharge};
use crate::time::now_ms;

/// Where an auction stands once the time-budgeted part is over.
enum Stage {
    /// The request id already has a stored result.
    Replay(AuctionResult),
    Decided(Decision),
}

/// A decided auction that has not been recorded yet.
struct Decision {
    result: AuctionResult,
    charge: Option<WinCharge>,
}

pub struct AuctionEngine {
    directory: Arc<dyn InventoryDirectory>,
    budgets: Arc<dyn BudgetStore>,
    results: Arc<dyn ResultStore>,
    snapshots: CandidateSnapshotCache,
    recorder: OutcomeRecorder,
    calculator: BidCalculator,
    tie_break: TieBreakPolicy,
    default_tmax: Duration,
    counters: Counters,
}

impl AuctionEngine {
    pub fn new(stores: AuctionStores, config: &AuctionConfig, counters: Counters) -> Self {
        Self {
            directory: stores.directory,
            budgets: stores.budgets,
            snapshots: CandidateSnapshotCache::new(
                stores.candidates,
                config.snapshot_max_staleness,
                config.snapshot_capacity,
            ),
            recorder: OutcomeRecorder::new(
                stores.results.clone(),
                config.persist_retries,
                counters.clone(),
            ),
            results: stores.results,
            calculator: BidCalculator::new(config.quality_weight),
            tie_break: config.tie_break,
            default_tmax: config.default_tmax,
            counters,
        }
    }

    /// Replaces the default calculator, e.g. to plug in a scoring provider.
    pub fn with_calculator(mut self, calculator: BidCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn snapshots(&self) -> &CandidateSnapshotCache {
        &self.snapshots
    }

    /// Runs one auction to its terminal state and returns the recorded result.
    ///
    /// A request id that already has a result gets that result back, with no
    /// scoring and no second charge. "No winner" is a `FAILED` result, not an
    /// error; errors are reserved for bad requests and unavailable stores.
    ///
    /// The replay check, the placement lookup and the decision all run under
    /// the time budget. Running out of it records a `TIME_BUDGET_EXCEEDED`
    /// failure.
    pub async fn run_auction(&self, request: &BidRequest) -> Result<AuctionResult, AuctionError> {
        request.validate()?;

        let deadline = Instant::now() + self.tmax(request);
        let span = auction_span(&request.request_id, &request.ad_unit_id, &TraceId::default());

        self.run_until(request, deadline).instrument(span).await
    }

    async fn run_until(
        &self,
        request: &BidRequest,
        deadline: Instant,
    ) -> Result<AuctionResult, AuctionError> {
        bump(&self.counters.auctions, 1);

        // Every read counts against the budget. A stage that completes after
        // the deadline is discarded too.
        let staged = tokio::time::timeout_at(deadline, self.stage(request)).await;
        let decision = match staged {
            Ok(Ok(Stage::Replay(existing))) => {
                bump(&self.counters.replayed, 1);
                info!(status = %existing.status, "request already decided; replaying result");
                return Ok(existing);
            }
            Ok(Ok(Stage::Decided(d))) if Instant::now() <= deadline => d,
            Ok(Err(e)) => return Err(e),
            Ok(Ok(Stage::Decided(_))) | Err(_) => {
                bump(&self.counters.timed_out, 1);
                warn!("time budget exceeded; failing closed");
                Decision {
                    result: self.failed(request, FailureReason::TimeBudgetExceeded, 0, vec![]),
                    charge: None,
                }
            }
        };

        let recorded = self
            .recorder
            .record(decision.result, decision.charge)
            .instrument(child_span("record"))
            .await?;

        let result = match recorded {
            Recorded::Applied(r) => {
                match r.status {
                    AuctionStatus::Served => bump(&self.counters.served, 1),
                    AuctionStatus::Failed => bump(&self.counters.failed, 1),
                }
                r
            }
            Recorded::Replayed(r) => {
                bump(&self.counters.replayed, 1);
                r
            }
        };

        let span = tracing::Span::current();
        span.record("status", tracing::field::display(result.status));
        if let Some(winner) = &result.winning_candidate_id {
            span.record("winner", winner.as_str());
        }
        info!(
            participants = result.participant_count,
            clearing_price = result.clearing_price,
            "auction finished"
        );

        Ok(result)
    }

    /// Replay check, placement lookup and the decision itself.
    async fn stage(&self, request: &BidRequest) -> Result<Stage, AuctionError> {
        if let Some(existing) = self.lookup_existing(&request.request_id).await? {
            return Ok(Stage::Replay(existing));
        }
        let ad_unit = self.resolve_ad_unit(request).await?;
        self.decide(request, &ad_unit).await.map(Stage::Decided)
    }

    fn tmax(&self, request: &BidRequest) -> Duration {
        request
            .tmax_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_tmax)
    }

    async fn lookup_existing(&self, request_id: &str) -> Result<Option<AuctionResult>, AuctionError> {
        self.results
            .get_by_request_id(request_id)
            .await
            .map_err(|e| AuctionError::Store(format!("{e:#}")))
    }

    async fn resolve_ad_unit(&self, request: &BidRequest) -> Result<AdUnit, AuctionError> {
        let unit = self
            .directory
            .get_ad_unit(&request.ad_unit_id)
            .await
            .map_err(|e| AuctionError::Store(format!("{e:#}")))?
            .ok_or_else(|| AuctionError::NotFound {
                kind: "ad unit",
                id: request.ad_unit_id.clone(),
            })?;

        if unit.site_id != request.site_id {
            return Err(AuctionError::NotFound {
                kind: "site",
                id: request.site_id.clone(),
            });
        }
        Ok(unit)
    }

    /// Everything between "request accepted" and "outcome ready to record".
    async fn decide(&self, request: &BidRequest, ad_unit: &AdUnit) -> Result<Decision, AuctionError> {
        let mut phase = AuctionPhase::Pending;

        let snapshot = self
            .snapshots
            .get(&ad_unit.ad_unit_id, &ad_unit.organization_id)
            .await
            .map_err(|e| AuctionError::Store(format!("{e:#}")))?;
        let budgets = self.load_budgets(&snapshot).await?;

        let filtered = filter_eligible(&snapshot, request, ad_unit, &budgets);
        let mut diagnostics: Vec<Diagnostic> = filtered
            .rejected
            .into_iter()
            .map(|(candidate_id, reason)| Diagnostic {
                candidate_id,
                outcome: DiagnosticOutcome::Ineligible { reason },
            })
            .collect();

        if filtered.eligible.is_empty() {
            enter(&mut phase, AuctionPhase::Failed);
            return Ok(Decision {
                result: self.failed(request, FailureReason::NoEligibleCandidates, 0, diagnostics),
                charge: None,
            });
        }

        enter(&mut phase, AuctionPhase::Scoring);
        let bid_set = self.calculator.evaluate(&filtered.eligible, request, &budgets);
        bump(&self.counters.below_floor, bid_set.below_floor);
        bump(&self.counters.scoring_failures, bid_set.scoring_failures);
        diagnostics.extend(bid_set.diagnostics);

        if bid_set.bids.is_empty() {
            enter(&mut phase, AuctionPhase::Failed);
            return Ok(Decision {
                result: self.failed(request, FailureReason::NoQualifyingBids, 0, diagnostics),
                charge: None,
            });
        }

        let resolution = resolve(bid_set.bids, self.tie_break, &request.request_id);
        enter(&mut phase, AuctionPhase::Resolved);

        diagnostics.extend(resolution.ranked.iter().enumerate().map(|(i, b)| Diagnostic {
            candidate_id: b.candidate_id.clone(),
            outcome: DiagnosticOutcome::Bid {
                final_bid: b.bid_amount,
                total_score: b.total_score,
                rank: i as u32 + 1,
            },
        }));

        let participant_count = resolution.participant_count();
        let Some(winner) = resolution.winner() else {
            enter(&mut phase, AuctionPhase::Failed);
            return Ok(Decision {
                result: self.failed(request, FailureReason::NoQualifyingBids, 0, diagnostics),
                charge: None,
            });
        };

        let clears_floor = resolution.clearing_price >= request.floor_price;
        if !clears_floor {
            warn!(
                clearing_price = resolution.clearing_price,
                floor_price = request.floor_price,
                "clearing price under the floor; failing closed"
            );
            enter(&mut phase, AuctionPhase::Failed);
            return Ok(Decision {
                result: self.failed(request, FailureReason::NoQualifyingBids, 0, diagnostics),
                charge: None,
            });
        }

        let charge = WinCharge {
            candidate_id: winner.candidate_id.clone(),
            campaign_id: winner.campaign_id.clone(),
            amount: resolution.clearing_price,
        };
        enter(&mut phase, AuctionPhase::Served);
        sort_diagnostics(&mut diagnostics);

        Ok(Decision {
            result: AuctionResult {
                request_id: request.request_id.clone(),
                status: AuctionStatus::Served,
                failure_reason: None,
                winning_candidate_id: Some(winner.candidate_id.clone()),
                winning_campaign_id: Some(winner.campaign_id.clone()),
                clearing_price: resolution.clearing_price,
                participant_count,
                diagnostics,
                impression_id: request.impression_id.clone(),
                deal_id: request.deal_id.clone(),
                decided_at_ms: now_ms(),
            },
            charge: Some(charge),
        })
    }

    /// Budget state for every campaign in the snapshot, fetched concurrently.
    async fn load_budgets(
        &self,
        snapshot: &[Candidate],
    ) -> Result<HashMap<String, BudgetState>, AuctionError> {
        let campaign_ids: BTreeSet<&str> =
            snapshot.iter().map(|c| c.campaign_id.as_str()).collect();

        let states = try_join_all(campaign_ids.iter().map(|id| self.budgets.get_state(id)))
            .await
            .map_err(|e| AuctionError::Store(format!("{e:#}")))?;

        Ok(states
            .into_iter()
            .flatten()
            .map(|b| (b.campaign_id.clone(), b))
            .collect())
    }

    fn failed(
        &self,
        request: &BidRequest,
        reason: FailureReason,
        participant_count: u32,
        mut diagnostics: Vec<Diagnostic>,
    ) -> AuctionResult {
        sort_diagnostics(&mut diagnostics);
        AuctionResult {
            request_id: request.request_id.clone(),
            status: AuctionStatus::Failed,
            failure_reason: Some(reason),
            winning_candidate_id: None,
            winning_campaign_id: None,
            clearing_price: 0.0,
            participant_count,
            diagnostics,
            impression_id: request.impression_id.clone(),
            deal_id: request.deal_id.clone(),
            decided_at_ms: now_ms(),
        }
    }
}

fn enter(phase: &mut AuctionPhase, next: AuctionPhase) {
    match phase.advance(next) {
        Ok(()) => debug!(phase = %next, "auction phase"),
        Err((from, to)) => warn!(%from, %to, "rejected auction phase transition"),
    }
}

fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::candidate::tests::mk_candidate;
    use crate::model::request::tests::mk_request;
    use crate::model::{StrategyKind, StrategyParams};
    use crate::store::memory::MemoryStore;

    fn manual(id: &str, max_bid: f64) -> Candidate {
        mk_candidate(
            id,
            StrategyKind::Manual,
            StrategyParams {
                max_bid: Some(max_bid),
                ..Default::default()
            },
        )
    }

    fn store_with(candidates: Vec<Candidate>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.put_ad_unit(AdUnit {
            ad_unit_id: "unit-1".into(),
            site_id: "site-1".into(),
            organization_id: "org-1".into(),
            format: None,
            size: None,
        });
        for c in candidates {
            store.put_budget(BudgetState {
                campaign_id: c.campaign_id.clone(),
                spent_to_date: 50.0,
                cap: 100.0,
            });
            store.put_candidate(c);
        }
        store
    }

    fn engine(store: Arc<MemoryStore>) -> AuctionEngine {
        AuctionEngine::new(
            AuctionStores::shared(store),
            &AuctionConfig::default(),
            Counters::default(),
        )
    }

    #[tokio::test]
    async fn validation_errors_record_nothing() {
        let store = store_with(vec![manual("a", 2.0)]);
        let engine = engine(store.clone());

        let mut req = mk_request("r1");
        req.ad_unit_id = " ".into();
        let err = engine.run_auction(&req).await.unwrap_err();

        assert!(matches!(err, AuctionError::Validation(_)));
        assert_eq!(store.result_count(), 0);
    }

    #[tokio::test]
    async fn unknown_ad_unit_and_site_mismatch_are_not_found() {
        let engine = engine(store_with(vec![manual("a", 2.0)]));

        let mut req = mk_request("r1");
        req.ad_unit_id = "nope".into();
        let err = engine.run_auction(&req).await.unwrap_err();
        assert!(matches!(err, AuctionError::NotFound { kind: "ad unit", .. }));

        let mut req = mk_request("r2");
        req.site_id = "site-9".into();
        let err = engine.run_auction(&req).await.unwrap_err();
        assert!(matches!(err, AuctionError::NotFound { kind: "site", .. }));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn winner_is_charged_and_diagnostics_are_sorted() {
        let store = store_with(vec![manual("b", 2.0), manual("a", 3.0)]);
        let engine = engine(store.clone());

        let result = engine.run_auction(&mk_request("r1")).await.unwrap();

        assert_eq!(result.status, AuctionStatus::Served);
        assert_eq!(result.winning_candidate_id.as_deref(), Some("a"));
        assert_eq!(result.participant_count, 2);
        assert_eq!(result.impression_id.as_deref(), Some("imp-1"));

        let ids: Vec<_> = result.diagnostics.iter().map(|d| d.candidate_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(matches!(
            result.diagnostics[0].outcome,
            DiagnosticOutcome::Bid { rank: 1, .. }
        ));

        let spent = store.budget("camp-a").unwrap().spent_to_date;
        assert!((spent - (50.0 + result.clearing_price)).abs() < 1e-9);
        assert_eq!(store.candidate("a").unwrap().stats.impressions, 1);
        assert_eq!(store.candidate("b").unwrap().stats.impressions, 0);
        assert_eq!(engine.counters().snapshot().served, 1);
    }

    #[tokio::test]
    async fn replay_returns_identical_result_without_new_charges() {
        let store = store_with(vec![manual("a", 3.0)]);
        let engine = engine(store.clone());
        let req = mk_request("r1");

        let first = engine.run_auction(&req).await.unwrap();
        let spent = store.budget("camp-a").unwrap().spent_to_date;
        let second = engine.run_auction(&req).await.unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(store.budget("camp-a").unwrap().spent_to_date, spent);
        assert_eq!(store.candidate("a").unwrap().stats.impressions, 1);

        let snap = engine.counters().snapshot();
        assert_eq!(snap.auctions, 2);
        assert_eq!(snap.replayed, 1);
    }

    #[tokio::test]
    async fn no_candidates_is_a_failed_result() {
        let store = store_with(vec![]);
        let engine = engine(store.clone());

        let result = engine.run_auction(&mk_request("r1")).await.unwrap();

        assert_eq!(result.status, AuctionStatus::Failed);
        assert_eq!(result.failure_reason, Some(FailureReason::NoEligibleCandidates));
        assert!(!result.has_winner());
        assert_eq!(result.clearing_price, 0.0);
        assert_eq!(store.result_count(), 1);
        assert_eq!(engine.counters().snapshot().failed, 1);
    }

    #[tokio::test]
    async fn exhausted_budget_is_reported_as_ineligible() {
        let store = store_with(vec![manual("a", 3.0)]);
        store.put_budget(BudgetState {
            campaign_id: "camp-a".into(),
            spent_to_date: 100.0,
            cap: 100.0,
        });
        let engine = engine(store.clone());

        let result = engine.run_auction(&mk_request("r1")).await.unwrap();

        assert_eq!(result.failure_reason, Some(FailureReason::NoEligibleCandidates));
        assert!(matches!(
            result.diagnostics[0].outcome,
            DiagnosticOutcome::Ineligible { .. }
        ));
        assert_eq!(store.budget("camp-a").unwrap().spent_to_date, 100.0);
    }

    #[tokio::test]
    async fn bids_below_floor_fail_the_auction() {
        let store = store_with(vec![manual("a", 3.0)]);
        let engine = engine(store.clone());

        let mut req = mk_request("r1");
        req.floor_price = 1_000.0;
        let result = engine.run_auction(&req).await.unwrap();

        assert_eq!(result.failure_reason, Some(FailureReason::NoQualifyingBids));
        assert_eq!(result.participant_count, 0);
        assert!(matches!(
            result.diagnostics[0].outcome,
            DiagnosticOutcome::BelowFloor { .. }
        ));
        assert_eq!(engine.counters().snapshot().below_floor, 1);
        assert_eq!(store.candidate("a").unwrap().stats.impressions, 0);
    }

    #[tokio::test]
    async fn deal_id_passes_through() {
        let engine = engine(store_with(vec![manual("a", 3.0)]));
        let mut req = mk_request("r1");
        req.deal_id = Some("deal-42".into());

        let result = engine.run_auction(&req).await.unwrap();
        assert_eq!(result.deal_id.as_deref(), Some("deal-42"));
    }
}
