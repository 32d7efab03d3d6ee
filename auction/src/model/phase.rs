use std::fmt;

use super::result::AuctionStatus;

/// Lifecycle of one auction.
///
/// ```text
/// Pending -> Failed                       (no eligible candidates)
/// Pending -> Scoring -> Failed            (no bid survives the floor)
/// Pending -> Scoring -> Resolved -> Served
/// Scoring | Resolved -> Failed            (time budget exceeded)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuctionPhase {
    Pending,
    Scoring,
    Resolved,
    Served,
    Failed,
}

impl AuctionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuctionPhase::Served | AuctionPhase::Failed)
    }

    pub fn can_advance_to(&self, next: AuctionPhase) -> bool {
        use AuctionPhase::*;
        matches!(
            (self, next),
            (Pending, Scoring)
                | (Pending, Failed)
                | (Scoring, Resolved)
                | (Scoring, Failed)
                | (Resolved, Served)
                | (Resolved, Failed)
        )
    }

    /// Moves to `next`, or returns the rejected transition.
    pub fn advance(&mut self, next: AuctionPhase) -> Result<(), (AuctionPhase, AuctionPhase)> {
        if !self.can_advance_to(next) {
            return Err((*self, next));
        }
        *self = next;
        Ok(())
    }

    /// Persisted status of a terminal phase.
    pub fn status(&self) -> Option<AuctionStatus> {
        match self {
            AuctionPhase::Served => Some(AuctionStatus::Served),
            AuctionPhase::Failed => Some(AuctionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AuctionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
