use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Placements
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS ad_units (
  ad_unit_id TEXT PRIMARY KEY,
  site_id TEXT NOT NULL,
  organization_id TEXT NOT NULL,
  layout_json TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Candidates; nested settings are stored as JSON documents
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS candidates (
  candidate_id TEXT PRIMARY KEY,
  campaign_id TEXT NOT NULL,
  organization_id TEXT NOT NULL,
  status TEXT NOT NULL,
  campaign_status TEXT NOT NULL,
  creative_json TEXT NOT NULL,
  targeting_json TEXT NOT NULL,
  strategy TEXT NOT NULL,
  params_json TEXT NOT NULL,
  impressions BIGINT NOT NULL DEFAULT 0,
  clicks BIGINT NOT NULL DEFAULT 0,
  conversions BIGINT NOT NULL DEFAULT 0,
  advertiser_category TEXT NOT NULL DEFAULT '',
  created_at_ms BIGINT NOT NULL,
  updated_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
CREATE INDEX IF NOT EXISTS idx_candidates_org
ON candidates (organization_id, status, campaign_status);
"#,
    )
    .execute(pool)
    .await?;

    // Campaign budgets
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS budgets (
  campaign_id TEXT PRIMARY KEY,
  spent_to_date REAL NOT NULL,
  cap REAL NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // One row per request; payload_json is the full result as returned
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS auction_results (
  request_id TEXT PRIMARY KEY,
  status TEXT NOT NULL,
  winning_candidate_id TEXT NOT NULL,
  clearing_price REAL NOT NULL,
  decided_at_ms BIGINT NOT NULL,
  payload_json TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Applied spend increments, keyed by request id
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS spend_ledger (
  request_id TEXT PRIMARY KEY,
  campaign_id TEXT NOT NULL,
  amount REAL NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
