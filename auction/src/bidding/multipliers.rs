//! Multipliers applied on top of the base bid. All pure.

use crate::eligibility::{category_match, device_match, geo_match};
use crate::model::{BidRequest, Candidate, PerformanceStats};
use crate::time::MS_PER_DAY;

pub const QUALITY_MIN: f64 = 0.5;
pub const QUALITY_MAX: f64 = 1.0;

/// CTR contribution = ctr * CTR_WEIGHT, capped at CTR_CAP.
pub const CTR_WEIGHT: f64 = 10.0;
pub const CTR_CAP: f64 = 0.3;
/// Conversion-rate contribution = cvr * CVR_WEIGHT, capped at CVR_CAP.
pub const CVR_WEIGHT: f64 = 1.0;
pub const CVR_CAP: f64 = 0.15;
/// Recency bonus for a campaign touched "now"; zero after the window.
pub const RECENCY_BONUS_MAX: f64 = 0.05;
pub const RECENCY_WINDOW_DAYS: f64 = 30.0;

pub const TARGETING_MIN: f64 = 0.7;
pub const TARGETING_MAX: f64 = 1.3;
pub const TARGETING_NEUTRAL: f64 = 1.0;

/// Budget pacing bands, checked in order; first match wins, otherwise ×1.0.
const PACING_POLICY: [(PacingBand, f64); 3] = [
    (PacingBand::Above(0.9), 0.8),
    (PacingBand::Above(0.7), 0.9),
    (PacingBand::Below(0.3), 1.2),
];

#[derive(Clone, Copy, Debug)]
enum PacingBand {
    Above(f64),
    Below(f64),
}

impl PacingBand {
    fn contains(&self, utilization: f64) -> bool {
        match *self {
            PacingBand::Above(t) => utilization > t,
            PacingBand::Below(t) => utilization < t,
        }
    }
}

/// Quality multiplier in [0.5, 1.0] from history and recency.
pub fn quality_multiplier(candidate: &Candidate, now_ms: u64) -> f64 {
    let q = QUALITY_MIN
        + history_contribution(&candidate.stats)
        + recency_bonus(candidate.updated_at_ms, now_ms);
    q.clamp(QUALITY_MIN, QUALITY_MAX)
}

fn history_contribution(stats: &PerformanceStats) -> f64 {
    let ctr = (stats.ctr() * CTR_WEIGHT).min(CTR_CAP);
    let cvr = (stats.conversion_rate() * CVR_WEIGHT).min(CVR_CAP);
    ctr + cvr
}

/// Linearly decays from `RECENCY_BONUS_MAX` to zero over the window.
/// Timestamps in the future count as age zero.
pub fn recency_bonus(updated_at_ms: u64, now_ms: u64) -> f64 {
    let age_days = now_ms.saturating_sub(updated_at_ms) as f64 / MS_PER_DAY as f64;
    RECENCY_BONUS_MAX * (1.0 - age_days / RECENCY_WINDOW_DAYS).max(0.0)
}

/// Targeting multiplier in [0.7, 1.3].
///
/// Neutral (1.0) when no dimension is constrained on both sides; otherwise
/// the mean per-dimension match score mapped linearly onto the range.
pub fn targeting_multiplier(candidate: &Candidate, request: &BidRequest) -> f64 {
    let t = &candidate.targeting;
    let scores: Vec<f64> = [
        geo_match(t, &request.geo),
        device_match(t, request),
        category_match(t, request),
    ]
    .iter()
    .filter_map(|m| m.score())
    .collect();

    if scores.is_empty() {
        return TARGETING_NEUTRAL;
    }

    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (TARGETING_MIN + (TARGETING_MAX - TARGETING_MIN) * mean).clamp(TARGETING_MIN, TARGETING_MAX)
}

/// Pacing multiplier from budget utilization.
pub fn budget_multiplier(utilization: f64) -> f64 {
    PACING_POLICY
        .iter()
        .find(|(band, _)| band.contains(utilization))
        .map(|(_, m)| *m)
        .unwrap_or(1.0)
}

/// Quality multiplier normalised to [0, 1].
pub fn quality_score(quality_multiplier: f64) -> f64 {
    ((quality_multiplier - QUALITY_MIN) / (QUALITY_MAX - QUALITY_MIN)).clamp(0.0, 1.0)
}

/// Targeting multiplier normalised to [0, 1].
pub fn targeting_score(targeting_multiplier: f64) -> f64 {
    ((targeting_multiplier - TARGETING_MIN) / (TARGETING_MAX - TARGETING_MIN)).clamp(0.0, 1.0)
}
