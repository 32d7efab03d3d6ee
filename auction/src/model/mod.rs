pub mod bid;
pub mod budget;
pub mod candidate;
pub mod inventory;
pub mod phase;
pub mod request;
pub mod result;

pub use bid::Bid;
pub use budget::BudgetState;
pub use candidate::{
    AdFormat, AdSize, BiddingConfig, Candidate, CreativeSpec, EntityStatus, PerformanceStats,
    StrategyKind, StrategyParams, Targeting,
};
pub use inventory::AdUnit;
pub use phase::AuctionPhase;
pub use request::{BidRequest, DeviceType, GeoContext};
pub use result::{AuctionResult, AuctionStatus, Diagnostic, DiagnosticOutcome, FailureReason};
