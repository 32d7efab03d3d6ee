use thiserror::Error;

/// Errors surfaced to the caller of `run_auction`.
///
/// "No inventory" is deliberately absent: an auction without a winner is a
/// recorded `FAILED` result, not an error.
#[derive(Error, Debug)]
pub enum AuctionError {
    #[error("invalid bid request: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("persisting auction outcome failed: {0}")]
    Persistence(String),

    #[error("store unavailable: {0}")]
    Store(String),
}

impl AuctionError {
    /// True for errors caused by the request itself (4xx class).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound { .. })
    }
}

/// Failure while scoring a single candidate. Never aborts the auction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("strategy {strategy} requires parameter `{param}`")]
    MissingParameter {
        strategy: &'static str,
        param: &'static str,
    },

    #[error("parameter `{param}` must be finite and non-negative, got {value}")]
    InvalidParameter { param: &'static str, value: f64 },

    #[error("campaign has no budget state")]
    MissingBudgetState,

    #[error("computed {what} is not a finite number")]
    NonFinite { what: &'static str },
}
