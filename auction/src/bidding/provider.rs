use crate::model::{BidRequest, Candidate};

/// Hook for a real predictive / optimisation model.
///
/// Implementations must be deterministic for a given candidate and request.
/// Their output is re-validated by the calculator: a non-finite or negative
/// base bid fails that candidate, and quality is clamped to its range.
pub trait ScoringProvider: Send + Sync {
    fn adjust_base_bid(&self, _candidate: &Candidate, _request: &BidRequest, base_bid: f64) -> f64 {
        base_bid
    }

    fn adjust_quality(&self, _candidate: &Candidate, _request: &BidRequest, quality: f64) -> f64 {
        quality
    }
}

/// Uses the static strategy table and history-based quality as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticScoring;

impl ScoringProvider for StaticScoring {}
