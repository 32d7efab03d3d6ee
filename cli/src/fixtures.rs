use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use auction::model::{AdUnit, BidRequest, BudgetState, Candidate};
use auction::store::sqlx_store::SqlxAuctionStore;

/// Seed data for a local database.
#[derive(Debug, Default, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub ad_units: Vec<AdUnit>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub budgets: Vec<BudgetState>,
}

impl Fixtures {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixtures {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing fixtures {}", path.display()))
    }

    pub async fn seed(&self, store: &SqlxAuctionStore) -> anyhow::Result<()> {
        for unit in &self.ad_units {
            store.put_ad_unit(unit).await?;
        }
        for c in &self.candidates {
            store
                .put_candidate(c)
                .await
                .with_context(|| format!("seeding candidate {}", c.candidate_id))?;
        }
        for b in &self.budgets {
            store.put_budget(b).await?;
        }

        tracing::info!(
            ad_units = self.ad_units.len(),
            candidates = self.candidates.len(),
            budgets = self.budgets.len(),
            "fixtures seeded"
        );
        Ok(())
    }
}

pub fn load_request(path: &Path) -> anyhow::Result<BidRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing request {}", path.display()))
}
