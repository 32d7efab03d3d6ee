//! Interfaces to the collaborators that own durable state.
//!
//! The engine only ever talks to these traits. `memory` backs tests and local
//! runs; `sqlx_store` is the transactional implementation.

pub mod memory;
pub mod sqlx_store;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{AdUnit, AuctionResult, BudgetState, Candidate};

/// Placement lookup, used to reject unknown ad units and sites.
#[async_trait]
pub trait InventoryDirectory: Send + Sync {
    async fn get_ad_unit(&self, ad_unit_id: &str) -> Result<Option<AdUnit>>;
}

/// Campaign store view: candidates that are active by status.
///
/// Bundled sources partition by organization; `ad_unit_id` is available to
/// sources that partition inventory by placement.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn list_eligible(&self, ad_unit_id: &str, organization_id: &str)
    -> Result<Vec<Candidate>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendOutcome {
    Applied,
    AlreadyApplied,
}

#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn get_state(&self, campaign_id: &str) -> Result<Option<BudgetState>>;

    /// Adds `amount` to the campaign's spend, at most once per `request_id`.
    async fn increment_spend(
        &self,
        request_id: &str,
        campaign_id: &str,
        amount: f64,
    ) -> Result<SpendOutcome>;
}

/// Counter mutations owed by the winner of an auction.
#[derive(Clone, Debug, PartialEq)]
pub struct WinCharge {
    pub candidate_id: String,
    pub campaign_id: String,
    /// The clearing price. It is a total score, so it carries the
    /// `quality_score * W` component on top of a bid that was capped to the
    /// remaining budget. A campaign near its cap can be overshot by up to W.
    pub amount: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    AlreadyPresent,
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn get_by_request_id(&self, request_id: &str) -> Result<Option<AuctionResult>>;

    /// Inserts `result` keyed by its request id and, only if the row was newly
    /// inserted, applies `charge` (spend + impression) in the same transaction.
    /// Either everything is applied or nothing is.
    async fn upsert(
        &self,
        result: &AuctionResult,
        charge: Option<&WinCharge>,
    ) -> Result<UpsertOutcome>;
}

/// The four collaborators an engine needs.
#[derive(Clone)]
pub struct AuctionStores {
    pub directory: Arc<dyn InventoryDirectory>,
    pub candidates: Arc<dyn CandidateSource>,
    pub budgets: Arc<dyn BudgetStore>,
    pub results: Arc<dyn ResultStore>,
}

impl AuctionStores {
    /// All four roles served by one backend.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: InventoryDirectory + CandidateSource + BudgetStore + ResultStore + 'static,
    {
        Self {
            directory: store.clone(),
            candidates: store.clone(),
            budgets: store.clone(),
            results: store,
        }
    }
}
