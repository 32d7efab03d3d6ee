use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::eligibility::Eligibility;

/// Persisted terminal status of an auction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Served,
    Failed,
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuctionStatus::Served => "SERVED",
            AuctionStatus::Failed => "FAILED",
        })
    }
}

impl FromStr for AuctionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SERVED" => Ok(AuctionStatus::Served),
            "FAILED" => Ok(AuctionStatus::Failed),
            other => Err(format!("unknown auction status {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    NoEligibleCandidates,
    NoQualifyingBids,
    TimeBudgetExceeded,
}

/// What happened to one candidate in one auction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticOutcome {
    Ineligible { reason: Eligibility },
    BelowFloor { final_bid: f64 },
    ScoringFailed { message: String },
    Bid { final_bid: f64, total_score: f64, rank: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub candidate_id: String,
    pub outcome: DiagnosticOutcome,
}

/// Outcome of one auction, persisted exactly once per `request_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuctionResult {
    pub request_id: String,
    pub status: AuctionStatus,
    pub failure_reason: Option<FailureReason>,

    pub winning_candidate_id: Option<String>,
    pub winning_campaign_id: Option<String>,
    /// Price charged to the winner; 0 when there is none.
    pub clearing_price: f64,
    /// Number of bids that survived the floor filter.
    pub participant_count: u32,
    /// Sorted by candidate id.
    pub diagnostics: Vec<Diagnostic>,

    pub impression_id: Option<String>,
    pub deal_id: Option<String>,
    pub decided_at_ms: u64,
}

impl AuctionResult {
    pub fn has_winner(&self) -> bool {
        self.winning_candidate_id.is_some()
    }
}
