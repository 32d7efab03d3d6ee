//! In-process store. Every mutation happens under one lock, so the
//! result-plus-counters write is atomic the same way the SQL transaction is.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    BudgetStore, CandidateSource, InventoryDirectory, ResultStore, SpendOutcome, UpsertOutcome,
    WinCharge,
};
use crate::model::{AdUnit, AuctionResult, BudgetState, Candidate, EntityStatus};

#[derive(Default)]
struct State {
    ad_units: HashMap<String, AdUnit>,
    candidates: HashMap<String, Candidate>,
    budgets: HashMap<String, BudgetState>,
    results: HashMap<String, AuctionResult>,
    ledger: HashSet<String>,
}

impl State {
    fn apply_spend(
        &mut self,
        request_id: &str,
        campaign_id: &str,
        amount: f64,
    ) -> Result<SpendOutcome> {
        if self.ledger.contains(request_id) {
            return Ok(SpendOutcome::AlreadyApplied);
        }
        let Some(budget) = self.budgets.get_mut(campaign_id) else {
            bail!("no budget row for campaign {campaign_id}");
        };
        budget.spent_to_date += amount;
        self.ledger.insert(request_id.to_string());
        Ok(SpendOutcome::Applied)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_ad_unit(&self, unit: AdUnit) {
        self.state
            .lock()
            .ad_units
            .insert(unit.ad_unit_id.clone(), unit);
    }

    pub fn put_candidate(&self, candidate: Candidate) {
        self.state
            .lock()
            .candidates
            .insert(candidate.candidate_id.clone(), candidate);
    }

    pub fn put_budget(&self, budget: BudgetState) {
        self.state
            .lock()
            .budgets
            .insert(budget.campaign_id.clone(), budget);
    }

    pub fn candidate(&self, candidate_id: &str) -> Option<Candidate> {
        self.state.lock().candidates.get(candidate_id).cloned()
    }

    pub fn budget(&self, campaign_id: &str) -> Option<BudgetState> {
        self.state.lock().budgets.get(campaign_id).cloned()
    }

    pub fn result_count(&self) -> usize {
        self.state.lock().results.len()
    }
}

#[async_trait]
impl InventoryDirectory for MemoryStore {
    async fn get_ad_unit(&self, ad_unit_id: &str) -> Result<Option<AdUnit>> {
        Ok(self.state.lock().ad_units.get(ad_unit_id).cloned())
    }
}

#[async_trait]
impl CandidateSource for MemoryStore {
    async fn list_eligible(
        &self,
        _ad_unit_id: &str,
        organization_id: &str,
    ) -> Result<Vec<Candidate>> {
        let state = self.state.lock();
        let mut out: Vec<Candidate> = state
            .candidates
            .values()
            .filter(|c| {
                c.organization_id == organization_id
                    && c.status == EntityStatus::Active
                    && c.campaign_status == EntityStatus::Active
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));
        Ok(out)
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn get_state(&self, campaign_id: &str) -> Result<Option<BudgetState>> {
        Ok(self.budget(campaign_id))
    }

    async fn increment_spend(
        &self,
        request_id: &str,
        campaign_id: &str,
        amount: f64,
    ) -> Result<SpendOutcome> {
        self.state
            .lock()
            .apply_spend(request_id, campaign_id, amount)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn get_by_request_id(&self, request_id: &str) -> Result<Option<AuctionResult>> {
        Ok(self.state.lock().results.get(request_id).cloned())
    }

    async fn upsert(
        &self,
        result: &AuctionResult,
        charge: Option<&WinCharge>,
    ) -> Result<UpsertOutcome> {
        let mut state = self.state.lock();
        if state.results.contains_key(&result.request_id) {
            return Ok(UpsertOutcome::AlreadyPresent);
        }

        if let Some(charge) = charge {
            // check both rows before mutating anything
            if !state.candidates.contains_key(&charge.candidate_id) {
                bail!("no candidate row for {}", charge.candidate_id);
            }
            state.apply_spend(&result.request_id, &charge.campaign_id, charge.amount)?;
            if let Some(c) = state.candidates.get_mut(&charge.candidate_id) {
                c.stats.impressions += 1;
            }
        }

        state
            .results
            .insert(result.request_id.clone(), result.clone());
        Ok(UpsertOutcome::Applied)
    }
}
