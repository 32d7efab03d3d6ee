use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::bidding::DEFAULT_QUALITY_WEIGHT;
use crate::resolver::TieBreakPolicy;

#[derive(Clone, Debug)]
pub struct AuctionConfig {
    /// Database connection string.
    pub database_url: String,

    // =========================
    // Time budget
    // =========================
    /// Time budget applied when a request does not carry its own `tmax_ms`.
    ///
    /// An auction that is still scoring when its budget expires fails closed
    /// and is recorded as having no winner.
    pub default_tmax: Duration,

    // =========================
    // Candidate snapshot
    // =========================
    /// Maximum age of a cached candidate snapshot.
    ///
    /// Status and budget-cap changes made by campaign management become
    /// visible to the eligibility filter no later than this.
    pub snapshot_max_staleness: Duration,

    /// Maximum number of (ad unit, organization) snapshots held in memory.
    pub snapshot_capacity: usize,

    // =========================
    // Scoring / ranking
    // =========================
    /// Weight W in `total_score = final_bid + quality_score * W`.
    ///
    /// Large enough for quality to reorder close bids, small enough that a
    /// much higher price still wins.
    pub quality_weight: f64,

    /// How exact `total_score` ties are ordered.
    pub tie_break: TieBreakPolicy,

    // =========================
    // Persistence
    // =========================
    /// Extra attempts of the idempotent result upsert after a failure.
    pub persist_retries: u32,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://auction_dev.db".to_string(),
            default_tmax: Duration::from_millis(120),
            snapshot_max_staleness: Duration::from_millis(5_000),
            snapshot_capacity: 1_024,
            quality_weight: DEFAULT_QUALITY_WEIGHT,
            tie_break: TieBreakPolicy::CreatedThenId,
            persist_retries: 1,
        }
    }
}

impl AuctionConfig {
    pub fn from_env() -> Self {
        let d = Self::default();

        let database_url = std::env::var("DATABASE_URL").unwrap_or(d.database_url);

        let tie_break = match std::env::var("AUCTION_TIE_BREAK_SEED") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(seed) => TieBreakPolicy::Seeded(seed),
                Err(_) => {
                    warn!(value = %raw, "invalid AUCTION_TIE_BREAK_SEED; using deterministic tie-break");
                    d.tie_break
                }
            },
            Err(_) => d.tie_break,
        };

        Self {
            database_url,
            default_tmax: Duration::from_millis(env_or(
                "AUCTION_DEFAULT_TMAX_MS",
                d.default_tmax.as_millis() as u64,
            )),
            snapshot_max_staleness: Duration::from_millis(env_or(
                "AUCTION_SNAPSHOT_MAX_STALENESS_MS",
                d.snapshot_max_staleness.as_millis() as u64,
            )),
            snapshot_capacity: env_or("AUCTION_SNAPSHOT_CAPACITY", d.snapshot_capacity).max(1),
            quality_weight: non_negative_weight(
                "AUCTION_QUALITY_WEIGHT",
                env_or("AUCTION_QUALITY_WEIGHT", d.quality_weight),
                d.quality_weight,
            ),
            tie_break,
            persist_retries: env_or("AUCTION_PERSIST_RETRIES", d.persist_retries),
        }
    }
}

fn env_or<T>(key: &'static str, default: T) -> T
where
    T: FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(key: &'static str, raw: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!(key, value = %raw, "malformed config value; using default");
            default
        }
    }
}

/// A weight that could push a clearing price under the floor is rejected.
fn non_negative_weight(key: &'static str, value: f64, default: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        return value;
    }
    warn!(key, value, "weight must be finite and non-negative; using default");
    default
}
