use serde::{Deserialize, Serialize};

/// One candidate's offer in one auction. Never outlives the auction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub candidate_id: String,
    pub campaign_id: String,
    /// Creation time of the candidate; first tie-break key.
    pub created_at_ms: u64,

    /// Price offered, already capped and above the floor.
    pub bid_amount: f64,
    /// In [0, 1].
    pub quality_score: f64,
    /// In [0, 1].
    pub targeting_score: f64,
    /// Ranking value: `bid_amount + quality_score * W`.
    pub total_score: f64,
}
