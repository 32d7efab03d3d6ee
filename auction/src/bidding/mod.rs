//! Bid calculation.
//!
//! `final_bid = base × quality × targeting × pacing`, capped by the
//! candidate's max bid and its campaign's remaining budget. A candidate
//! below the floor produces no bid. A candidate that fails to score is
//! skipped and reported; it never aborts the auction.

pub mod multipliers;
pub mod provider;
pub mod strategy;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ScoringError;
use crate::model::{Bid, BidRequest, BudgetState, Candidate, Diagnostic, DiagnosticOutcome};

pub use provider::{ScoringProvider, StaticScoring};

/// Every intermediate value of one candidate's score, for diagnostics and tests.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoreBreakdown {
    pub base_bid: f64,
    pub quality_multiplier: f64,
    pub targeting_multiplier: f64,
    pub budget_multiplier: f64,
    pub final_bid: f64,
    pub quality_score: f64,
    pub targeting_score: f64,
    pub total_score: f64,
}

/// Bids that cleared the floor plus one diagnostic per skipped candidate.
#[derive(Debug, Default)]
pub struct BidSet {
    pub bids: Vec<Bid>,
    pub diagnostics: Vec<Diagnostic>,
    pub below_floor: u64,
    pub scoring_failures: u64,
}

/// W in `total_score = final_bid + quality_score * W`.
pub const DEFAULT_QUALITY_WEIGHT: f64 = 10.0;

#[derive(Clone)]
pub struct BidCalculator {
    quality_weight: f64,
    provider: Arc<dyn ScoringProvider>,
}

impl BidCalculator {
    pub fn new(quality_weight: f64) -> Self {
        Self::with_provider(quality_weight, Arc::new(StaticScoring))
    }

    /// A negative or non-finite weight is replaced by the default; it would
    /// let a total score, and so a clearing price, drop under the floor.
    pub fn with_provider(quality_weight: f64, provider: Arc<dyn ScoringProvider>) -> Self {
        let quality_weight = if quality_weight.is_finite() && quality_weight >= 0.0 {
            quality_weight
        } else {
            warn!(quality_weight, "invalid quality weight; using default");
            DEFAULT_QUALITY_WEIGHT
        };
        Self {
            quality_weight,
            provider,
        }
    }

    pub fn quality_weight(&self) -> f64 {
        self.quality_weight
    }

    /// Scores one candidate against one request.
    pub fn score(
        &self,
        candidate: &Candidate,
        request: &BidRequest,
        budget: &BudgetState,
    ) -> Result<ScoreBreakdown, ScoringError> {
        let base = strategy::base_bid(&candidate.bidding)?;
        let base_bid = self.provider.adjust_base_bid(candidate, request, base);
        if !base_bid.is_finite() {
            return Err(ScoringError::NonFinite { what: "base bid" });
        }
        if base_bid < 0.0 {
            return Err(ScoringError::InvalidParameter {
                param: "base_bid",
                value: base_bid,
            });
        }

        let quality = multipliers::quality_multiplier(candidate, request.timestamp_ms);
        let quality_multiplier = self
            .provider
            .adjust_quality(candidate, request, quality)
            .clamp(multipliers::QUALITY_MIN, multipliers::QUALITY_MAX);
        if quality_multiplier.is_nan() {
            return Err(ScoringError::NonFinite { what: "quality" });
        }

        let targeting_multiplier = multipliers::targeting_multiplier(candidate, request);
        let budget_multiplier = multipliers::budget_multiplier(budget.utilization());

        let mut final_bid = base_bid * quality_multiplier * targeting_multiplier * budget_multiplier;
        if let Some(max_bid) = candidate.bidding.params.max_bid.filter(|m| m.is_finite()) {
            final_bid = final_bid.min(max_bid.max(0.0));
        }
        final_bid = final_bid.min(budget.remaining());

        if !final_bid.is_finite() {
            return Err(ScoringError::NonFinite { what: "final bid" });
        }

        let quality_score = multipliers::quality_score(quality_multiplier);
        let targeting_score = multipliers::targeting_score(targeting_multiplier);
        let total_score = final_bid + quality_score * self.quality_weight;
        if !total_score.is_finite() {
            return Err(ScoringError::NonFinite {
                what: "total score",
            });
        }

        Ok(ScoreBreakdown {
            base_bid,
            quality_multiplier,
            targeting_multiplier,
            budget_multiplier,
            final_bid,
            quality_score,
            targeting_score,
            total_score,
        })
    }

    /// Scores every eligible candidate and drops those below the floor.
    ///
    /// Candidates must have passed eligibility, so their budget state exists;
    /// a missing one is reported as a scoring failure.
    pub fn evaluate(
        &self,
        candidates: &[&Candidate],
        request: &BidRequest,
        budgets: &HashMap<String, BudgetState>,
    ) -> BidSet {
        let mut out = BidSet::default();

        for c in candidates {
            let scored = match budgets.get(&c.campaign_id) {
                Some(budget) => self.score(c, request, budget),
                None => Err(ScoringError::MissingBudgetState),
            };

            let breakdown = match scored {
                Ok(b) => b,
                Err(e) => {
                    warn!(
                        candidate_id = %c.candidate_id,
                        error = %e,
                        "candidate scoring failed; skipping"
                    );
                    out.scoring_failures += 1;
                    out.diagnostics.push(Diagnostic {
                        candidate_id: c.candidate_id.clone(),
                        outcome: DiagnosticOutcome::ScoringFailed {
                            message: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            if breakdown.final_bid < request.floor_price {
                debug!(
                    candidate_id = %c.candidate_id,
                    final_bid = breakdown.final_bid,
                    floor = request.floor_price,
                    "bid below floor"
                );
                out.below_floor += 1;
                out.diagnostics.push(Diagnostic {
                    candidate_id: c.candidate_id.clone(),
                    outcome: DiagnosticOutcome::BelowFloor {
                        final_bid: breakdown.final_bid,
                    },
                });
                continue;
            }

            out.bids.push(Bid {
                candidate_id: c.candidate_id.clone(),
                campaign_id: c.campaign_id.clone(),
                created_at_ms: c.created_at_ms,
                bid_amount: breakdown.final_bid,
                quality_score: breakdown.quality_score,
                targeting_score: breakdown.targeting_score,
                total_score: breakdown.total_score,
            });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::candidate::tests::mk_candidate;
    use crate::model::request::tests::mk_request;
    use crate::model::{StrategyKind, StrategyParams};
    use tracing_test::traced_test;

    #[test]
    fn invalid_quality_weight_falls_back_to_default() {
        for w in [-10.0, f64::NAN, f64::NEG_INFINITY, f64::INFINITY] {
            assert_eq!(BidCalculator::new(w).quality_weight(), DEFAULT_QUALITY_WEIGHT);
        }
        assert_eq!(BidCalculator::new(0.0).quality_weight(), 0.0);
    }

    fn budget(campaign: &str, spent: f64, cap: f64) -> BudgetState {
        BudgetState {
            campaign_id: campaign.into(),
            spent_to_date: spent,
            cap,
        }
    }

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

    fn request() -> BidRequest {
        let mut r = mk_request("r");
        // Unconstrained targeting, no recency bonus for the fixtures.
        r.categories.clear();
        r.timestamp_ms = 1_000 + 365 * crate::time::MS_PER_DAY;
        r
    }

    #[test]
    fn final_bid_multiplies_and_caps() {
        let calc = BidCalculator::new(10.0);
        let c = mk_candidate(
            "a",
            StrategyKind::TargetCpa,
            StrategyParams {
                target_cpa: Some(40.0),
                max_bid: Some(1.5),
                ..Default::default()
            },
        );

        // base 4.0 × quality 0.5 × targeting 1.0 × pacing 1.2 = 2.4, capped to 1.5
        let s = calc.score(&c, &request(), &budget("camp-a", 0.0, 100.0)).unwrap();
        assert_eq!(s.base_bid, 4.0);
        assert_eq!(s.quality_multiplier, 0.5);
        assert_eq!(s.targeting_multiplier, 1.0);
        assert_eq!(s.budget_multiplier, 1.2);
        assert_eq!(s.final_bid, 1.5);
        assert_eq!(s.quality_score, 0.0);
        assert_eq!(s.total_score, 1.5);
    }

    #[test]
    fn final_bid_capped_by_remaining_budget() {
        let calc = BidCalculator::new(10.0);
        let c = manual("a", 5.0);
        let s = calc.score(&c, &request(), &budget("camp-a", 99.0, 100.0)).unwrap();
        assert_eq!(s.final_bid, 1.0);
    }

    #[test]
    fn quality_feeds_total_score() {
        let calc = BidCalculator::new(10.0);
        let mut c = manual("a", 1.0);
        c.stats.impressions = 100;
        c.stats.clicks = 1; // ctr 1% -> +0.1
        let s = calc.score(&c, &request(), &budget("camp-a", 50.0, 100.0)).unwrap();
        assert!((s.quality_score - 0.2).abs() < 1e-9);
        assert!((s.total_score - (s.final_bid + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn below_floor_produces_no_bid() {
        let calc = BidCalculator::new(10.0);
        let mut r = request();
        r.floor_price = 0.001;

        // 0.0009 × 0.5 × 1.0 × 1.0 stays under the floor.
        let low = manual("low", 0.0009);
        let budgets = HashMap::from([("camp-low".to_string(), budget("camp-low", 50.0, 100.0))]);

        let out = calc.evaluate(&[&low], &r, &budgets);
        assert!(out.bids.is_empty());
        assert_eq!(out.below_floor, 1);
        assert!(matches!(
            out.diagnostics[0].outcome,
            DiagnosticOutcome::BelowFloor { .. }
        ));
    }

    #[test]
    #[traced_test]
    fn scoring_failure_skips_only_that_candidate() {
        let calc = BidCalculator::new(10.0);
        let broken = mk_candidate("broken", StrategyKind::AutoCpm, StrategyParams::default());
        let good = manual("good", 1.0);

        let budgets = HashMap::from([
            ("camp-broken".to_string(), budget("camp-broken", 0.0, 100.0)),
            ("camp-good".to_string(), budget("camp-good", 0.0, 100.0)),
        ]);

        let out = calc.evaluate(&[&broken, &good], &request(), &budgets);

        assert_eq!(out.bids.len(), 1);
        assert_eq!(out.bids[0].candidate_id, "good");
        assert_eq!(out.scoring_failures, 1);
        assert_eq!(out.diagnostics[0].candidate_id, "broken");
        assert!(logs_contain("candidate scoring failed"));
    }

    #[test]
    fn provider_output_is_revalidated() {
        struct Wild;
        impl ScoringProvider for Wild {
            fn adjust_base_bid(&self, _: &Candidate, _: &BidRequest, _: f64) -> f64 {
                f64::NAN
            }
        }

        struct Generous;
        impl ScoringProvider for Generous {
            fn adjust_quality(&self, _: &Candidate, _: &BidRequest, _: f64) -> f64 {
                7.0
            }
        }

        let c = manual("a", 1.0);
        let b = budget("camp-a", 0.0, 100.0);

        let wild = BidCalculator::with_provider(10.0, Arc::new(Wild));
        assert_eq!(
            wild.score(&c, &request(), &b),
            Err(ScoringError::NonFinite { what: "base bid" })
        );

        let generous = BidCalculator::with_provider(10.0, Arc::new(Generous));
        let s = generous.score(&c, &request(), &b).unwrap();
        assert_eq!(s.quality_multiplier, multipliers::QUALITY_MAX);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::model::candidate::tests::mk_candidate;
    use crate::model::request::tests::mk_request;
    use crate::model::{StrategyKind, StrategyParams};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]
        #[test]
        fn every_emitted_bid_clears_the_floor(
            floor in 0.0..=5.0f64,
            max_bid in 0.0..=10.0f64,
            target_cpa in 0.0..=50.0f64,
            spent in 0.0..=100.0f64,
            impressions in 0..=10_000u64,
            clicks in 0..=500u64,
        ) {
            let calc = BidCalculator::new(10.0);
            let mut r = mk_request("p");
            r.floor_price = floor;

            let mut c = mk_candidate(
                "p",
                StrategyKind::TargetCpa,
                StrategyParams { target_cpa: Some(target_cpa), max_bid: Some(max_bid), ..Default::default() },
            );
            c.stats.impressions = impressions;
            c.stats.clicks = clicks.min(impressions);

            let budgets = HashMap::from([(
                "camp-p".to_string(),
                BudgetState { campaign_id: "camp-p".into(), spent_to_date: spent, cap: 100.0 },
            )]);

            let out = calc.evaluate(&[&c], &r, &budgets);
            for bid in &out.bids {
                prop_assert!(bid.bid_amount >= floor);
                prop_assert!(bid.bid_amount <= max_bid);
                prop_assert!(bid.total_score >= bid.bid_amount);
                prop_assert!((0.0..=1.0).contains(&bid.quality_score));
                prop_assert!((0.0..=1.0).contains(&bid.targeting_score));
            }
            prop_assert_eq!(out.bids.len() + out.diagnostics.len(), 1);
        }
    }
}
