use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{AnyPool, Row};

use super::{
    BudgetStore, CandidateSource, InventoryDirectory, ResultStore, SpendOutcome, UpsertOutcome,
    WinCharge,
};
use crate::model::{
    AdFormat, AdSize, AdUnit, AuctionResult, BiddingConfig, BudgetState, Candidate, CreativeSpec,
    PerformanceStats, StrategyKind, StrategyParams, Targeting,
};

/// SQLx-backed implementation of every store role.
/// Responsible only for persistence, row mapping and transaction boundaries.
#[derive(Clone)]
pub struct SqlxAuctionStore {
    pool: AnyPool,
}

#[derive(Serialize, Deserialize)]
struct Layout {
    format: Option<AdFormat>,
    size: Option<AdSize>,
}

impl SqlxAuctionStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub async fn put_ad_unit(&self, unit: &AdUnit) -> anyhow::Result<()> {
        let layout_json = serde_json::to_string(&Layout {
            format: unit.format,
            size: unit.size,
        })?;

        sqlx::query(
            r#"
INSERT INTO ad_units (ad_unit_id, site_id, organization_id, layout_json)
VALUES (?, ?, ?, ?)
ON CONFLICT(ad_unit_id) DO UPDATE SET
  site_id = excluded.site_id,
  organization_id = excluded.organization_id,
  layout_json = excluded.layout_json;
"#,
        )
        .bind(&unit.ad_unit_id)
        .bind(&unit.site_id)
        .bind(&unit.organization_id)
        .bind(layout_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn put_candidate(&self, c: &Candidate) -> anyhow::Result<()> {
        let creative_json = serde_json::to_string(&c.creative)?;
        let targeting_json = serde_json::to_string(&c.targeting)?;
        let params_json = serde_json::to_string(&c.bidding.params)?;

        sqlx::query(
            r#"
INSERT INTO candidates (
  candidate_id, campaign_id, organization_id,
  status, campaign_status,
  creative_json, targeting_json, strategy, params_json,
  impressions, clicks, conversions,
  advertiser_category, created_at_ms, updated_at_ms
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(candidate_id) DO UPDATE SET
  campaign_id = excluded.campaign_id,
  organization_id = excluded.organization_id,
  status = excluded.status,
  campaign_status = excluded.campaign_status,
  creative_json = excluded.creative_json,
  targeting_json = excluded.targeting_json,
  strategy = excluded.strategy,
  params_json = excluded.params_json,
  impressions = excluded.impressions,
  clicks = excluded.clicks,
  conversions = excluded.conversions,
  advertiser_category = excluded.advertiser_category,
  created_at_ms = excluded.created_at_ms,
  updated_at_ms = excluded.updated_at_ms;
"#,
        )
        .bind(&c.candidate_id)
        .bind(&c.campaign_id)
        .bind(&c.organization_id)
        .bind(c.status.to_string())
        .bind(c.campaign_status.to_string())
        .bind(creative_json)
        .bind(targeting_json)
        .bind(c.bidding.strategy.as_str())
        .bind(params_json)
        .bind(u64_to_i64(c.stats.impressions)?)
        .bind(u64_to_i64(c.stats.clicks)?)
        .bind(u64_to_i64(c.stats.conversions)?)
        .bind(c.advertiser_category.clone().unwrap_or_default())
        .bind(u64_to_i64(c.created_at_ms)?)
        .bind(u64_to_i64(c.updated_at_ms)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn put_budget(&self, b: &BudgetState) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO budgets (campaign_id, spent_to_date, cap)
VALUES (?, ?, ?)
ON CONFLICT(campaign_id) DO UPDATE SET
  spent_to_date = excluded.spent_to_date,
  cap = excluded.cap;
"#,
        )
        .bind(&b.campaign_id)
        .bind(b.spent_to_date)
        .bind(b.cap)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads one candidate regardless of status.
    pub async fn fetch_candidate(&self, candidate_id: &str) -> anyhow::Result<Option<Candidate>> {
        let row = sqlx::query(&format!("{CANDIDATE_SELECT} WHERE candidate_id = ?;"))
            .bind(candidate_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_candidate).transpose()
    }
}

const CANDIDATE_SELECT: &str = r#"
SELECT
  candidate_id, campaign_id, organization_id,
  status, campaign_status,
  creative_json, targeting_json, strategy, params_json,
  impressions, clicks, conversions,
  advertiser_category, created_at_ms, updated_at_ms
FROM candidates
"#;

#[async_trait]
impl InventoryDirectory for SqlxAuctionStore {
    async fn get_ad_unit(&self, ad_unit_id: &str) -> anyhow::Result<Option<AdUnit>> {
        let row = sqlx::query(
            r#"
SELECT ad_unit_id, site_id, organization_id, layout_json
FROM ad_units
WHERE ad_unit_id = ?;
"#,
        )
        .bind(ad_unit_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let layout: Layout = serde_json::from_str(&r.get::<String, _>("layout_json"))
                    .context("invalid layout_json")?;
                Ok(Some(AdUnit {
                    ad_unit_id: r.get("ad_unit_id"),
                    site_id: r.get("site_id"),
                    organization_id: r.get("organization_id"),
                    format: layout.format,
                    size: layout.size,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CandidateSource for SqlxAuctionStore {
    async fn list_eligible(
        &self,
        _ad_unit_id: &str,
        organization_id: &str,
    ) -> anyhow::Result<Vec<Candidate>> {
        let rows = sqlx::query(&format!(
            "{CANDIDATE_SELECT} WHERE organization_id = ? AND status = 'ACTIVE' \
             AND campaign_status = 'ACTIVE' ORDER BY candidate_id;"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_candidate(&r) {
                Ok(c) => out.push(c),
                Err(e) => {
                    // one bad row must not take the whole snapshot down
                    tracing::warn!(error = %e, "skipping malformed candidate row");
                }
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl BudgetStore for SqlxAuctionStore {
    async fn get_state(&self, campaign_id: &str) -> anyhow::Result<Option<BudgetState>> {
        let row = sqlx::query(
            r#"
SELECT campaign_id, spent_to_date, cap
FROM budgets
WHERE campaign_id = ?;
"#,
        )
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| BudgetState {
            campaign_id: r.get("campaign_id"),
            spent_to_date: r.get::<f64, _>("spent_to_date"),
            cap: r.get::<f64, _>("cap"),
        }))
    }

    async fn increment_spend(
        &self,
        request_id: &str,
        campaign_id: &str,
        amount: f64,
    ) -> anyhow::Result<SpendOutcome> {
        let mut tx = self.pool.begin().await?;
        let outcome = apply_spend(&mut tx, request_id, campaign_id, amount).await?;
        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl ResultStore for SqlxAuctionStore {
    async fn get_by_request_id(&self, request_id: &str) -> anyhow::Result<Option<AuctionResult>> {
        let row = sqlx::query(
            r#"
SELECT payload_json
FROM auction_results
WHERE request_id = ?;
"#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let payload: String = r.get("payload_json");
                let result = serde_json::from_str(&payload)
                    .with_context(|| format!("invalid payload_json for request {request_id}"))?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn upsert(
        &self,
        result: &AuctionResult,
        charge: Option<&WinCharge>,
    ) -> anyhow::Result<UpsertOutcome> {
        let payload_json = serde_json::to_string(result)?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
INSERT INTO auction_results (
  request_id, status, winning_candidate_id, clearing_price, decided_at_ms, payload_json
)
VALUES (?, ?, ?, ?, ?, ?)
ON CONFLICT(request_id) DO NOTHING;
"#,
        )
        .bind(&result.request_id)
        .bind(result.status.to_string())
        .bind(result.winning_candidate_id.clone().unwrap_or_default())
        .bind(result.clearing_price)
        .bind(u64_to_i64(result.decided_at_ms)?)
        .bind(payload_json)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(UpsertOutcome::AlreadyPresent);
        }

        if let Some(charge) = charge {
            apply_spend(&mut tx, &result.request_id, &charge.campaign_id, charge.amount).await?;

            let touched = sqlx::query(
                r#"
UPDATE candidates
SET impressions = impressions + 1
WHERE candidate_id = ?;
"#,
            )
            .bind(&charge.candidate_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            // dropping the transaction rolls back the result and the spend
            if touched != 1 {
                return Err(anyhow!("no candidate row for {}", charge.candidate_id));
            }
        }

        tx.commit().await?;
        Ok(UpsertOutcome::Applied)
    }
}

/// Ledger row first; the budget moves only when the ledger row is new.
/// A missing budget row is an error, so the caller's transaction rolls back.
async fn apply_spend(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    request_id: &str,
    campaign_id: &str,
    amount: f64,
) -> anyhow::Result<SpendOutcome> {
    let recorded = sqlx::query(
        r#"
INSERT INTO spend_ledger (request_id, campaign_id, amount)
VALUES (?, ?, ?)
ON CONFLICT(request_id) DO NOTHING;
"#,
    )
    .bind(request_id)
    .bind(campaign_id)
    .bind(amount)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if recorded == 0 {
        return Ok(SpendOutcome::AlreadyApplied);
    }

    let updated = sqlx::query(
        r#"
UPDATE budgets
SET spent_to_date = spent_to_date + ?
WHERE campaign_id = ?;
"#,
    )
    .bind(amount)
    .bind(campaign_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated != 1 {
        return Err(anyhow!("no budget row for campaign {campaign_id}"));
    }

    Ok(SpendOutcome::Applied)
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_candidate(r: &sqlx::any::AnyRow) -> anyhow::Result<Candidate> {
    let creative: CreativeSpec =
        serde_json::from_str(&r.get::<String, _>("creative_json")).context("invalid creative_json")?;
    let targeting: Targeting = serde_json::from_str(&r.get::<String, _>("targeting_json"))
        .context("invalid targeting_json")?;
    let params: StrategyParams =
        serde_json::from_str(&r.get::<String, _>("params_json")).context("invalid params_json")?;

    let category: String = r.get("advertiser_category");

    Ok(Candidate {
        candidate_id: r.get("candidate_id"),
        campaign_id: r.get("campaign_id"),
        organization_id: r.get("organization_id"),
        status: r
            .get::<String, _>("status")
            .parse()
            .map_err(|e: String| anyhow!(e))?,
        campaign_status: r
            .get::<String, _>("campaign_status")
            .parse()
            .map_err(|e: String| anyhow!(e))?,
        creative,
        targeting,
        bidding: BiddingConfig {
            strategy: StrategyKind::from(r.get::<String, _>("strategy")),
            params,
        },
        stats: PerformanceStats {
            impressions: i64_to_u64(r.get("impressions"))?,
            clicks: i64_to_u64(r.get("clicks"))?,
            conversions: i64_to_u64(r.get("conversions"))?,
        },
        advertiser_category: (!category.is_empty()).then_some(category),
        created_at_ms: i64_to_u64(r.get("created_at_ms"))?,
        updated_at_ms: i64_to_u64(r.get("updated_at_ms"))?,
    })
}

/* =========================
Numeric safety helpers
========================= */

fn i64_to_u64(v: i64) -> anyhow::Result<u64> {
    if v < 0 {
        return Err(anyhow!("negative i64 where u64 expected: {v}"));
    }
    Ok(v as u64)
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    if v > i64::MAX as u64 {
        return Err(anyhow!("u64 too large for i64: {v}"));
    }
    Ok(v as i64)
}
