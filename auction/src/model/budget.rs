use serde::{Deserialize, Serialize};

/// Spend state of one campaign, shared by every concurrent auction.
///
/// Only the outcome recorder mutates it, and only through the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub campaign_id: String,
    pub spent_to_date: f64,
    pub cap: f64,
}

impl BudgetState {
    /// Fraction of the cap already spent. A non-positive cap counts as fully used.
    pub fn utilization(&self) -> f64 {
        if self.cap <= 0.0 {
            return 1.0;
        }
        (self.spent_to_date / self.cap).max(0.0)
    }

    pub fn remaining(&self) -> f64 {
        (self.cap - self.spent_to_date).max(0.0)
    }

    pub fn has_headroom(&self) -> bool {
        self.spent_to_date < self.cap
    }
}
